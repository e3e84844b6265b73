//! Error types for the placement engine
//!
//! Every fatal planning failure maps to one variant here. Lost allocation
//! races are not errors: stores report them as [`SaveOutcome::Conflict`]
//! and the repos retry internally.
//!
//! [`SaveOutcome::Conflict`]: crate::traits::SaveOutcome::Conflict

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the placement engine
#[derive(Error, Debug)]
pub enum Error {
    /// Dynamic or vip pool exhausted on every eligible subnet
    #[error("Not enough capacity: {0}")]
    NotEnoughCapacity(String),

    /// Explicit IP already owned by another instance
    #[error("Network reservation already in use: {0}")]
    AlreadyInUse(String),

    /// Explicit IP is not inside any subnet of its network
    #[error("IP outside subnet: {0}")]
    IpOutsideSubnet(String),

    /// Explicit IP falls in a restricted range
    #[error("IP reserved: {0}")]
    IpReserved(String),

    /// Reservation needs an IP and has none
    #[error("IP missing: {0}")]
    IpMissing(String),

    /// Explicit IP requested with a type that disagrees with the subnet pools
    #[error("Wrong reservation type: {0}")]
    WrongType(String),

    /// AZ placement failures (undeclared AZs, unreachable static IPs, ...)
    #[error("Placement error: {0}")]
    Placement(String),

    /// Persistence handle failures
    #[error("Record store error: {0}")]
    RecordStore(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O errors from file-backed stores
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a capacity error
    pub fn not_enough_capacity(msg: impl Into<String>) -> Self {
        Self::NotEnoughCapacity(msg.into())
    }

    /// Create an "already in use" conflict error
    pub fn already_in_use(msg: impl Into<String>) -> Self {
        Self::AlreadyInUse(msg.into())
    }

    /// Create an "outside subnet" validation error
    pub fn ip_outside_subnet(msg: impl Into<String>) -> Self {
        Self::IpOutsideSubnet(msg.into())
    }

    /// Create a "reserved range" validation error
    pub fn ip_reserved(msg: impl Into<String>) -> Self {
        Self::IpReserved(msg.into())
    }

    /// Create a "missing IP" validation error
    pub fn ip_missing(msg: impl Into<String>) -> Self {
        Self::IpMissing(msg.into())
    }

    /// Create a wrong-type validation error
    pub fn wrong_type(msg: impl Into<String>) -> Self {
        Self::WrongType(msg.into())
    }

    /// Create a placement error
    pub fn placement(msg: impl Into<String>) -> Self {
        Self::Placement(msg.into())
    }

    /// Create a record store error
    pub fn record_store(msg: impl Into<String>) -> Self {
        Self::RecordStore(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether this error aborts planning because of operator input
    /// (as opposed to store or I/O trouble)
    pub fn is_manifest_error(&self) -> bool {
        matches!(
            self,
            Self::IpOutsideSubnet(_)
                | Self::IpReserved(_)
                | Self::IpMissing(_)
                | Self::WrongType(_)
                | Self::Placement(_)
                | Self::AlreadyInUse(_)
        )
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
