use thiserror::Error;

/// Startup failures. Fatal before any election is attempted.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unable to get hostname: {0}")]
    Hostname(#[source] nix::Error),

    #[error("couldn't create resource lock: {0}")]
    ResourceLock(#[from] LockError),

    #[error("couldn't create kube client: {0}")]
    Client(String),

    #[error("invalid timing policy: {0}")]
    Timing(String),
}

/// Failures talking to the cluster API.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Request(#[from] reqwest::Error),

    #[error("apiserver returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error(transparent)]
    Decode(#[from] serde_json::Error),

    #[error("malformed pod: {0}")]
    MalformedPod(String),

    #[error("request attempt timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Failures inside the lock backend. Only construction errors reach callers;
/// runtime errors end leadership instead.
#[derive(Error, Debug)]
pub enum LockError {
    #[error(transparent)]
    Etcd(#[from] etcd_client::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    #[error("invalid lock reference: {0}")]
    InvalidReference(String),

    #[error("lease renewal failed, leadership lost")]
    LeadershipLost,

    #[error("lease keepalive stream closed")]
    KeepAliveClosed,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to patch readiness condition after {attempts} attempts: {last_error}")]
    PatchExhausted { attempts: u32, last_error: ApiError },

    #[error(transparent)]
    Api(#[from] ApiError),
}

pub type Result<T> = std::result::Result<T, Error>;
