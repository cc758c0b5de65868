use thiserror::Error;

use crate::enums::Rcode;

/// When things go awry. Variants group into the taxonomy the query engine
/// maps onto response codes: wire/parse errors, policy refusals,
/// authentication failures, authoritative-state problems and infrastructure
/// faults.
#[derive(Debug, Error)]
pub enum AuthNsError {
    // --- wire / parse ---
    #[error("ran off the end of the buffer")]
    EndOfBuffer,
    #[error("offset outside the buffer")]
    OutOfBounds,
    #[error("label longer than 63 octets")]
    LabelTooLong,
    #[error("name longer than 255 octets")]
    NameTooLong,
    #[error("too many compression pointer jumps")]
    TooManyJumps,
    #[error("malformed packet: {0}")]
    MalformedPacket(String),
    #[error("failed to pack header bits: {0}")]
    BytePacking(String),

    // --- policy ---
    #[error("refused: {0}")]
    Refused(String),

    // --- authentication ---
    #[error(transparent)]
    Tsig(#[from] TsigError),

    // --- authoritative state ---
    #[error("zone {0} is not served here")]
    ZoneNotFound(String),
    #[error("zone {0} has no SOA record")]
    MissingSoa(String),

    // --- infrastructure ---
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("remote cache error: {0}")]
    Cache(#[from] redis::RedisError),
    #[error("store error: {0}")]
    Store(String),
    #[error("signing error: {0}")]
    Signing(String),
    /// Something failed in the start up of the platform
    #[error("startup error: {0}")]
    Startup(String),
    #[error("failed to send across a channel: {0}")]
    Send(String),
    #[error("{0}")]
    InvalidValue(String),
}

/// Distinct TSIG verification failures, RFC2845 section 4.5.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TsigError {
    #[error("no TSIG record present")]
    NotPresent,
    #[error("TSIG key is not known here")]
    UnknownKey,
    #[error("unsupported TSIG algorithm")]
    BadAlgorithm,
    #[error("time-signed outside the fudge window")]
    TimeDriftExceeded,
    #[error("MAC did not verify")]
    MacMismatch,
}

impl From<packed_struct::PackingError> for AuthNsError {
    fn from(error: packed_struct::PackingError) -> Self {
        AuthNsError::BytePacking(error.to_string())
    }
}

impl From<AuthNsError> for std::io::Error {
    fn from(error: AuthNsError) -> Self {
        match error {
            AuthNsError::Io(err) => err,
            other => std::io::Error::other(format!("{other}")),
        }
    }
}

impl AuthNsError {
    /// The response code a handler synthesizes when this error surfaces at
    /// the top of the pipeline.
    pub fn rcode(&self) -> Rcode {
        match self {
            AuthNsError::EndOfBuffer
            | AuthNsError::OutOfBounds
            | AuthNsError::LabelTooLong
            | AuthNsError::NameTooLong
            | AuthNsError::TooManyJumps
            | AuthNsError::MalformedPacket(_)
            | AuthNsError::BytePacking(_) => Rcode::FormatError,
            AuthNsError::Refused(_) => Rcode::Refused,
            AuthNsError::Tsig(_) => Rcode::NotAuth,
            AuthNsError::ZoneNotFound(_) => Rcode::NotAuth,
            AuthNsError::MissingSoa(_) => Rcode::ServFail,
            _ => Rcode::ServFail,
        }
    }
}
