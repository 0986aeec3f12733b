//! Target address parsing.
//!
//! A target is written `<host>:<port>`. The host must be an IP literal of the
//! selected [`AddressFamily`]; the core never performs name resolution.
//!
//! - IPv4 targets split on the first `:` (`10.0.0.5:11111`).
//! - IPv6 targets must bracket the address (`[fe80::1]:443`), since the
//!   address itself contains colons.
//! - [`AddressFamily::Any`] accepts either form.
//!
//! Checks run in a fixed order: separator, then port, then host. A port that
//! is not entirely decimal digits is read as `0` and therefore rejected as
//! out of range.

use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    str::FromStr,
};

use crate::error::TargetError;

/// Address family used to validate targets and open sockets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressFamily {
    /// IPv4 only
    #[default]
    V4,
    /// IPv6 only
    V6,
    /// Either family, chosen by the target's syntax
    Any,
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4 => f.write_str("ipv4"),
            Self::V6 => f.write_str("ipv6"),
            Self::Any => f.write_str("any"),
        }
    }
}

impl FromStr for AddressFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "4" | "v4" | "ipv4" => Ok(Self::V4),
            "6" | "v6" | "ipv6" => Ok(Self::V6),
            "any" | "0" => Ok(Self::Any),
            other => Err(format!("unknown address family '{other}' (expected any, 4 or 6)")),
        }
    }
}

/// A validated target: host text, parsed IP and port, always set together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetAddress {
    host: String,
    ip: IpAddr,
    port: u16,
}

impl TargetAddress {
    /// Host exactly as written in the target (without brackets).
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Parsed IP address.
    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    /// Port in `[1, 65535]`.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Concrete family of the parsed address (never [`AddressFamily::Any`]).
    pub fn family(&self) -> AddressFamily {
        match self.ip {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        }
    }

    /// Destination socket address.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

impl fmt::Display for TargetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

/// Parse a `host:port` target for the given address family.
pub fn parse_target(spec: &str, family: AddressFamily) -> Result<TargetAddress, TargetError> {
    let (host, port_text) = split_target(spec, family)?;

    let port = u16::try_from(parse_port(port_text))
        .ok()
        .filter(|port| *port != 0)
        .ok_or(TargetError::InvalidPort)?;

    let ip = parse_host(host, family)?;

    Ok(TargetAddress { host: host.to_string(), ip, port })
}

fn split_target(spec: &str, family: AddressFamily) -> Result<(&str, &str), TargetError> {
    if family != AddressFamily::V4 {
        if let Some(rest) = spec.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or(TargetError::NoPort)?;
            let port =
                tail.strip_prefix(':').filter(|p| !p.is_empty()).ok_or(TargetError::NoPort)?;
            return Ok((host, port));
        }
    }

    match spec.split_once(':') {
        Some((host, port)) if !port.is_empty() => Ok((host, port)),
        _ => Err(TargetError::NoPort),
    }
}

/// Decimal port text to a number; anything else reads as 0.
fn parse_port(text: &str) -> u32 {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return 0;
    }
    text.parse().unwrap_or(0)
}

fn parse_host(host: &str, family: AddressFamily) -> Result<IpAddr, TargetError> {
    let parsed = match family {
        AddressFamily::V4 => host.parse::<Ipv4Addr>().map(IpAddr::V4).ok(),
        AddressFamily::V6 => host.parse::<Ipv6Addr>().map(IpAddr::V6).ok(),
        AddressFamily::Any => host.parse::<IpAddr>().ok(),
    };
    parsed.ok_or(TargetError::InvalidHost)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn parses_ipv4_target() {
        let target = parse_target("10.0.0.5:11111", AddressFamily::V4).unwrap();
        assert_eq!(target.host(), "10.0.0.5");
        assert_eq!(target.port(), 11111);
        assert_eq!(target.family(), AddressFamily::V4);
        assert_eq!(target.socket_addr(), "10.0.0.5:11111".parse().unwrap());
    }

    #[test]
    fn missing_separator_is_no_port() {
        assert_eq!(parse_target("10.0.0.5", AddressFamily::V4), Err(TargetError::NoPort));
        assert_eq!(parse_target("10.0.0.5:", AddressFamily::V4), Err(TargetError::NoPort));
    }

    #[test]
    fn port_out_of_range_is_invalid_port() {
        assert_eq!(parse_target("10.0.0.5:70000", AddressFamily::V4), Err(TargetError::InvalidPort));
        assert_eq!(parse_target("10.0.0.5:0", AddressFamily::V4), Err(TargetError::InvalidPort));
        assert_eq!(
            parse_target("10.0.0.5:99999999999999", AddressFamily::V4),
            Err(TargetError::InvalidPort)
        );
    }

    #[test]
    fn non_numeric_port_reads_as_zero() {
        assert_eq!(parse_target("10.0.0.5:https", AddressFamily::V4), Err(TargetError::InvalidPort));
        assert_eq!(parse_target("10.0.0.5:80x", AddressFamily::V4), Err(TargetError::InvalidPort));
        assert_eq!(parse_target("10.0.0.5:443:x", AddressFamily::V4), Err(TargetError::InvalidPort));
    }

    #[test]
    fn port_is_checked_before_host() {
        assert_eq!(parse_target("bogus:0", AddressFamily::V4), Err(TargetError::InvalidPort));
        assert_eq!(parse_target("bogus:443", AddressFamily::V4), Err(TargetError::InvalidHost));
    }

    #[test]
    fn port_boundaries() {
        assert_eq!(parse_target("1.2.3.4:1", AddressFamily::V4).unwrap().port(), 1);
        assert_eq!(parse_target("1.2.3.4:65535", AddressFamily::V4).unwrap().port(), 65535);
        assert_eq!(parse_target("1.2.3.4:65536", AddressFamily::V4), Err(TargetError::InvalidPort));
    }

    #[test]
    fn family_gates_host_syntax() {
        assert_eq!(parse_target("[::1]:443", AddressFamily::V4), Err(TargetError::InvalidPort));
        assert_eq!(parse_target("10.0.0.5:443", AddressFamily::V6), Err(TargetError::InvalidHost));

        let v6 = parse_target("[::1]:443", AddressFamily::V6).unwrap();
        assert_eq!(v6.host(), "::1");
        assert_eq!(v6.family(), AddressFamily::V6);

        let any_v4 = parse_target("10.0.0.5:443", AddressFamily::Any).unwrap();
        assert_eq!(any_v4.family(), AddressFamily::V4);
        let any_v6 = parse_target("[fe80::2]:8443", AddressFamily::Any).unwrap();
        assert_eq!(any_v6.family(), AddressFamily::V6);
    }

    #[test]
    fn unterminated_bracket_is_no_port() {
        assert_eq!(parse_target("[::1", AddressFamily::V6), Err(TargetError::NoPort));
        assert_eq!(parse_target("[::1]", AddressFamily::V6), Err(TargetError::NoPort));
    }

    #[test]
    fn family_from_str() {
        assert_eq!("4".parse::<AddressFamily>(), Ok(AddressFamily::V4));
        assert_eq!("IPv6".parse::<AddressFamily>(), Ok(AddressFamily::V6));
        assert_eq!("ANY".parse::<AddressFamily>(), Ok(AddressFamily::Any));
        assert!("5".parse::<AddressFamily>().is_err());
    }

    proptest! {
        #[test]
        fn prop_valid_ipv4_targets_parse(octets in any::<[u8; 4]>(), port in 1u16..=u16::MAX) {
            let ip = Ipv4Addr::from(octets);
            let spec = format!("{ip}:{port}");
            let target = parse_target(&spec, AddressFamily::V4).unwrap();
            prop_assert_eq!(target.ip(), IpAddr::V4(ip));
            prop_assert_eq!(target.port(), port);
        }

        #[test]
        fn prop_parser_is_total(spec in ".{0,40}", family in prop_oneof![
            Just(AddressFamily::V4), Just(AddressFamily::V6), Just(AddressFamily::Any)
        ]) {
            if let Ok(target) = parse_target(&spec, family) {
                prop_assert!(target.port() >= 1);
                prop_assert!(family == AddressFamily::Any || target.family() == family);
            }
        }
    }
}
