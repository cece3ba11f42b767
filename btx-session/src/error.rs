use std::net::AddrParseError;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("invalid session address \"{0}\": expected \"a.b.c.d port\"")]
    InvalidAddress(String),

    #[error("invalid session address \"{0}\": {1}")]
    InvalidIp(String, #[source] AddrParseError),

    #[error("invalid session port \"{0}\": {1}")]
    InvalidPort(String, #[source] std::num::ParseIntError),

    #[error("failed to connect to {0}: {1}")]
    Connect(std::net::SocketAddr, #[source] std::io::Error),

    #[error("failed to configure socket: {0}")]
    SocketConfig(#[source] std::io::Error),

    #[error("host audio source failed: {0}")]
    HostSource(#[source] std::io::Error),

    #[error("host audio sink failed: {0}")]
    HostSink(#[source] std::io::Error),

    #[error("session hung up: {0:?}")]
    HungUp(btx_core::linklayer::HangUp),
}
