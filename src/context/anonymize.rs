//! Client IP anonymization.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Zero the host portion of an address.
///
/// IPv4 loses its last octet. IPv6 keeps its leading 48 bits and loses the
/// trailing 80. Accepts a bare address or an `addr:port` pair; anything else
/// yields `None`.
pub fn anonymize_ip(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let ip = raw
        .parse::<IpAddr>()
        .ok()
        .or_else(|| raw.parse::<SocketAddr>().ok().map(|s| s.ip()))?;
    Some(anonymize(ip).to_string())
}

pub fn anonymize(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, c, _] = v4.octets();
            IpAddr::V4(Ipv4Addr::new(a, b, c, 0))
        }
        IpAddr::V6(v6) => {
            let s = v6.segments();
            IpAddr::V6(Ipv6Addr::new(s[0], s[1], s[2], 0, 0, 0, 0, 0))
        }
    }
}

/// First address of an `X-Forwarded-For` style list.
pub fn first_forwarded(header: &str) -> Option<&str> {
    header
        .split(',')
        .map(str::trim)
        .find(|part| !part.is_empty())
}
