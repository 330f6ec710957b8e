use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;

/// Returns the current time in the configured timezone.
pub fn now_in_timezone(tz: &Tz) -> DateTime<Tz> {
    Utc::now().with_timezone(tz)
}

/// Server-side clock bound to one civil timezone.
///
/// Every record written by the ingest pipeline is stamped through this type,
/// so stored timestamps are comparable regardless of what timezone a client
/// declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeNormalizer {
    tz: Tz,
}

/// A normalized instant: the UTC value used for ordering and its local
/// rendering in the server zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedAt {
    pub utc: DateTime<Utc>,
    pub local: String,
}

impl TimeNormalizer {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn stamp(&self) -> RecordedAt {
        render(now_in_timezone(&self.tz))
    }

    pub fn normalize(&self, instant: DateTime<Utc>) -> RecordedAt {
        render(instant.with_timezone(&self.tz))
    }
}

fn render(local: DateTime<Tz>) -> RecordedAt {
    RecordedAt {
        utc: local.with_timezone(&Utc),
        local: local.to_rfc3339_opts(SecondsFormat::Secs, false),
    }
}
