use thiserror::Error;

/// Errors raised by the router and profile protocol clients. These never leave
/// the crate boundary as-is, see [`Error`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("router unreachable: {0}")]
    Connection(String),

    #[error("authorization rejected: {0}")]
    Authorization(String),

    #[error("unknown service: {0}")]
    Service(String),

    #[error("action failed: {0}")]
    Action(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("profile `{0}` not found")]
    ProfileNotFound(String),

    #[error("{0}")]
    Other(String),
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Category of an [`Error`]. This is what the session health flag and failed
/// resources report upwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Connection,
    ProfilePermission,
    ProfileNotFound,
    Protocol,
    StaleSnapshot,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Connection => write!(f, "connection_error"),
            ErrorKind::ProfilePermission => write!(f, "connection_error_profiles"),
            ErrorKind::ProfileNotFound => write!(f, "profile_not_found"),
            ErrorKind::Protocol => write!(f, "protocol_error"),
            ErrorKind::StaleSnapshot => write!(f, "stale_snapshot"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("cannot connect to the router: {0}")]
    Connection(String),

    #[error("profile credentials rejected: {0}")]
    ProfilePermission(String),

    #[error("profile `{0}` does not exist on the router")]
    ProfileNotFound(String),

    #[error("router protocol error: {0}")]
    Protocol(String),

    #[error("profile refresh failed, keeping previous snapshot: {0}")]
    StaleSnapshot(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connection(_) => ErrorKind::Connection,
            Error::ProfilePermission(_) => ErrorKind::ProfilePermission,
            Error::ProfileNotFound(_) => ErrorKind::ProfileNotFound,
            Error::Protocol(_) => ErrorKind::Protocol,
            Error::StaleSnapshot(_) => ErrorKind::StaleSnapshot,
        }
    }
}

impl From<ClientError> for Error {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Connection(_) | ClientError::Authorization(_) => {
                Error::Connection(err.to_string())
            }
            ClientError::PermissionDenied(_) => Error::ProfilePermission(err.to_string()),
            ClientError::ProfileNotFound(name) => Error::ProfileNotFound(name),
            ClientError::Service(_) | ClientError::Action(_) | ClientError::Other(_) => {
                Error::Protocol(err.to_string())
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unable to open config file: {0}")]
    ConfigFileError(#[from] std::io::Error),

    #[error("unable to parse config file: {0}")]
    ConfigReadError(#[from] serde_yaml::Error),

    #[error("unable to parse duration: {0}")]
    DurationParseError(String),

    #[error("duplicate host entries found: {0}")]
    DuplicateHost(String),
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{service}: no configured router for host `{host}`")]
    UnknownHost { service: &'static str, host: String },

    #[error("{service} failed: {source}")]
    Session {
        service: &'static str,
        #[source]
        source: Error,
    },
}
