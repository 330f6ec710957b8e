//! Network address to coarse location lookup.
//!
//! Lookups never fail: anything that cannot be resolved (malformed input,
//! non-public ranges, addresses missing from the snapshot) is reported as
//! `None` and ingestion carries on without a location.

use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    path::Path,
};

use maxminddb::{geoip2, MaxMindDBError, Reader};

use crate::models::GeoLocation;

pub trait GeoResolver: Send + Sync {
    /// Looks up an already-parsed public address.
    fn lookup(&self, ip: IpAddr) -> Option<GeoLocation>;

    /// Resolves a textual address; non-public or malformed input is a miss.
    fn resolve(&self, address: &str) -> Option<GeoLocation> {
        let ip = parse_public_ip(address)?;
        self.lookup(ip)
    }
}

/// Parses `address` and returns it only when it is globally routable.
///
/// Accepts bare IPv4/IPv6, `host:port` socket forms and IPv4-mapped IPv6.
pub fn parse_public_ip(address: &str) -> Option<IpAddr> {
    let trimmed = address.trim();
    let ip = trimmed
        .parse::<IpAddr>()
        .ok()
        .or_else(|| trimmed.parse::<SocketAddr>().ok().map(|s| s.ip()))?;

    let ip = match ip {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    };

    is_public(&ip).then_some(ip)
}

fn is_public(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => is_public_v6(v6),
    }
}

fn is_public_v4(ip: &Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    // 0.0.0.0/8, 100.64.0.0/10 carrier-grade NAT, 198.18.0.0/15 benchmarking
    // and 240.0.0.0/4 reserved
    let reserved = a == 0
        || (a == 100 && (b & 0xc0) == 64)
        || (a == 198 && (b & 0xfe) == 18)
        || a >= 240;
    !(ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_multicast()
        || ip.is_documentation()
        || reserved)
}

fn is_public_v6(ip: &Ipv6Addr) -> bool {
    let segments = ip.segments();
    let unique_local = (segments[0] & 0xfe00) == 0xfc00;
    let link_local = (segments[0] & 0xffc0) == 0xfe80;
    let documentation = segments[0] == 0x2001 && segments[1] == 0x0db8;
    !(ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        || unique_local
        || link_local
        || documentation)
}

/// Resolver backed by a MaxMind GeoLite2/GeoIP2 City snapshot.
pub struct MaxMindGeoResolver {
    reader: Reader<Vec<u8>>,
}

impl MaxMindGeoResolver {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MaxMindDBError> {
        let reader = Reader::open_readfile(path)?;
        Ok(Self { reader })
    }
}

impl GeoResolver for MaxMindGeoResolver {
    fn lookup(&self, ip: IpAddr) -> Option<GeoLocation> {
        match self.reader.lookup::<geoip2::City>(ip) {
            Ok(city) => Some(location_from_city(&city)),
            Err(err) => {
                tracing::debug!(%ip, error = %err, "geolocation lookup missed");
                None
            }
        }
    }
}

fn location_from_city(city: &geoip2::City<'_>) -> GeoLocation {
    let country = city
        .country
        .as_ref()
        .and_then(|c| c.iso_code)
        .map(str::to_string);
    let region = city
        .subdivisions
        .as_ref()
        .and_then(|subs| subs.first())
        .and_then(|sub| {
            sub.iso_code.map(str::to_string).or_else(|| {
                sub.names
                    .as_ref()
                    .and_then(|names| names.get("en"))
                    .map(|name| name.to_string())
            })
        });
    let city_name = city
        .city
        .as_ref()
        .and_then(|c| c.names.as_ref())
        .and_then(|names| names.get("en"))
        .map(|name| name.to_string());
    let location = city.location.as_ref();

    GeoLocation {
        country,
        region,
        city: city_name,
        timezone: location.and_then(|l| l.time_zone).map(str::to_string),
        latitude: location.and_then(|l| l.latitude),
        longitude: location.and_then(|l| l.longitude),
    }
}

/// Resolver over a fixed in-memory table.
///
/// The empty table is the fallback when no database snapshot is configured.
#[derive(Debug, Clone, Default)]
pub struct StaticGeoResolver {
    entries: HashMap<IpAddr, GeoLocation>,
}

impl StaticGeoResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, ip: IpAddr, location: GeoLocation) -> Self {
        self.entries.insert(ip, location);
        self
    }
}

impl GeoResolver for StaticGeoResolver {
    fn lookup(&self, ip: IpAddr) -> Option<GeoLocation> {
        self.entries.get(&ip).cloned()
    }
}
