use std::fmt;

use uuid::Uuid;

use crate::error::ConfigError;

/// The identity this process presents to the lock service.
///
/// The uniquifier keeps two processes on the same host (or two pods sharing a
/// hostname) from both believing they hold the lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionIdentity {
    hostname: String,
    uniquifier: Uuid,
}

impl ElectionIdentity {
    /// Resolve the local hostname and attach a fresh random uniquifier.
    pub fn generate() -> Result<Self, ConfigError> {
        let hostname = nix::unistd::gethostname()
            .map_err(ConfigError::Hostname)?
            .to_string_lossy()
            .into_owned();
        Ok(Self::from_hostname(hostname))
    }

    pub fn from_hostname(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            uniquifier: Uuid::new_v4(),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }
}

impl fmt::Display for ElectionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.hostname, self.uniquifier)
    }
}
