use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::str::FromStr;

use btx_core::linklayer::{LinkLayerConfig, DEFAULT_ENQ_RETRIES};

use crate::error::SessionError;

/// Parsed form of the application argument `"address port"` (space-separated
/// IPv4 dotted-quad and decimal port). Rejects malformed input up front rather
/// than failing deep inside connection setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub peer: SocketAddrV4,
    pub link_layer: LinkLayerConfig,
    pub enq_retries: u8,
}

impl SessionConfig {
    pub fn parse(arg: &str) -> Result<Self, SessionError> {
        let mut parts = arg.splitn(2, ' ');
        let addr_part = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SessionError::InvalidAddress(arg.to_string()))?;
        let port_part = parts
            .next()
            .ok_or_else(|| SessionError::InvalidAddress(arg.to_string()))?;

        let ip = Ipv4Addr::from_str(addr_part)
            .map_err(|e| SessionError::InvalidIp(addr_part.to_string(), e))?;
        let port: u16 = port_part
            .parse()
            .map_err(|e| SessionError::InvalidPort(port_part.to_string(), e))?;

        Ok(Self {
            peer: SocketAddrV4::new(ip, port),
            link_layer: LinkLayerConfig::production(),
            enq_retries: DEFAULT_ENQ_RETRIES,
        })
    }
}

impl fmt::Display for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.peer.ip(), self.peer.port())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_argument() {
        let cfg = SessionConfig::parse("127.0.0.1 8080").unwrap();
        assert_eq!(cfg.peer.ip(), &Ipv4Addr::new(127, 0, 0, 1));
        assert_eq!(cfg.peer.port(), 8080);
    }

    #[test]
    fn rejects_missing_separator() {
        assert!(matches!(
            SessionConfig::parse("127.0.0.1"),
            Err(SessionError::InvalidAddress(_))
        ));
    }

    #[test]
    fn rejects_non_numeric_port() {
        assert!(matches!(
            SessionConfig::parse("127.0.0.1 notaport"),
            Err(SessionError::InvalidPort(_, _))
        ));
    }

    #[test]
    fn rejects_unparsable_address() {
        assert!(matches!(
            SessionConfig::parse("not.an.ip 80"),
            Err(SessionError::InvalidIp(_, _))
        ));
    }

    #[test]
    fn display_roundtrips_through_parse() {
        let cfg = SessionConfig::parse("10.0.0.5 1234").unwrap();
        let rendered = cfg.to_string();
        let reparsed = SessionConfig::parse(&rendered).unwrap();
        assert_eq!(cfg, reparsed);
    }
}
