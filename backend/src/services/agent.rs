use woothee::parser::Parser;

pub const UNKNOWN_LABEL: &str = "Unknown";

/// woothee's marker for fields it could not classify.
const WOOTHEE_UNKNOWN: &str = "UNKNOWN";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentLabels {
    pub browser_label: String,
    pub os_label: String,
}

impl AgentLabels {
    pub fn unknown() -> Self {
        Self {
            browser_label: UNKNOWN_LABEL.to_string(),
            os_label: UNKNOWN_LABEL.to_string(),
        }
    }
}

/// Best-effort user-agent classification.
#[derive(Debug, Clone, Copy, Default)]
pub struct AgentParser;

impl AgentParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, raw_user_agent: &str) -> AgentLabels {
        let raw = raw_user_agent.trim();
        if raw.is_empty() {
            return AgentLabels::unknown();
        }

        let parser = Parser::new();
        let Some(result) = parser.parse(raw) else {
            return AgentLabels::unknown();
        };

        let browser_label = match known(result.name) {
            Some(name) => match known(result.version).and_then(|v| v.split('.').next()) {
                Some(major) if !major.is_empty() => format!("{} {}", name, major),
                _ => name.to_string(),
            },
            None => UNKNOWN_LABEL.to_string(),
        };
        let os_label = known(result.os)
            .map(str::to_string)
            .unwrap_or_else(|| UNKNOWN_LABEL.to_string());

        AgentLabels {
            browser_label,
            os_label,
        }
    }
}

fn known(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty() && value != WOOTHEE_UNKNOWN).then_some(value)
}
