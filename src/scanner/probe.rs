//! The per-host probe contract shared by the scanner and its probers.

use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Well-known SSH port.
pub const DEFAULT_PORT: u16 = 22;

/// Username and password used against every host of a scan.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One unit of work: a single host to try.
#[derive(Debug, Clone)]
pub struct ScanJob {
    pub addr: IpAddr,
    pub port: u16,
    pub credentials: Arc<Credentials>,
    /// Remote command to run after logging in. Empty means none.
    pub command: Arc<str>,
}

impl ScanJob {
    pub const fn socket(&self) -> SocketAddr {
        SocketAddr::new(self.addr, self.port)
    }

    pub fn has_command(&self) -> bool {
        !self.command.trim().is_empty()
    }
}

/// Why a host was left out of the results.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("connection failed: {0}")]
    Connect(#[source] io::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("ssh handshake failed: {0}")]
    Handshake(#[source] russh::Error),

    #[error("credentials rejected")]
    Rejected,

    #[error("probe task panicked")]
    Panicked,
}

impl From<russh::Error> for ProbeError {
    fn from(e: russh::Error) -> Self {
        match e {
            russh::Error::IO(e) => Self::Connect(e),
            e => Self::Handshake(e),
        }
    }
}

/// `Ok` holds the combined command output of a host that let us in.
pub type ProbeOutcome = Result<String, ProbeError>;

/// Tries one host.
///
/// Implementations must always return: every failure becomes an `Err` and
/// the host is excluded. The scanner bounds nothing itself, so a prober is
/// responsible for its own deadline.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, job: &ScanJob) -> ProbeOutcome;
}
