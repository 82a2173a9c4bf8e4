use crate::models::RoomId;
use thiserror::Error;

/// Failures reported by a key custody backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CustodyError {
    /// No key material stored under the requested slot
    #[error("Key not found in custody: {0}")]
    NotFound(String),

    /// Backend unreachable or answered with an error
    #[error("Key custody unavailable: {0}")]
    Unavailable(String),

    /// The call did not complete within the caller-supplied timeout
    #[error("Key custody call timed out after {0} ms")]
    Timeout(u64),

    /// Stored material could not be parsed
    #[error("Malformed key material: {0}")]
    Malformed(String),
}

/// Coarse classification used by callers to decide whether to retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input; retrying without changing it will fail again
    Validation,
    /// User-correctable shortage of free balance
    InsufficientFunds,
    /// Wrong room status for the requested transition
    State,
    NotFound,
    Unauthorized,
    /// Decryption or custody trouble; safe to retry later
    Transient,
    /// Ledger invariant broken; mutation of the account must stop
    Fatal,
    Internal,
}

/// Application-level error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Room window with start >= end
    #[error("Invalid betting window: start {start} must be before end {end}")]
    InvalidWindow { start: i64, end: i64 },

    /// Plaintext or ciphertext exceeds what the scheme can carry
    #[error("Payload too large: {size} bytes exceeds limit of {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Bettor {bettor} already placed a bet in room {room_id}")]
    DuplicateBettor { room_id: RoomId, bettor: String },

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Insufficient funds: available {available}, required {required}")]
    InsufficientFunds { available: u64, required: u64 },

    #[error("Room {0} is already closed for betting")]
    AlreadyClosed(RoomId),

    #[error("Room {room_id} betting window is still open until {end_time}")]
    BettingStillOpen { room_id: RoomId, end_time: i64 },

    /// Settlement requested before the outcome was decoded
    #[error("Room {0} is not ready for settlement")]
    NotReady(RoomId),

    #[error("Room {0} is already settled")]
    AlreadySettled(RoomId),

    /// Any other transition attempted from the wrong status
    #[error("Invalid room state: {0}")]
    InvalidState(String),

    /// Not found errors
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Unauthorized access errors
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Custody error: {0}")]
    Custody(#[from] CustodyError),

    #[error("Ledger invariant violated: {0}")]
    LedgerInvariantViolation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Message(String),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::InvalidWindow { .. }
            | AppError::PayloadTooLarge { .. }
            | AppError::DuplicateBettor { .. }
            | AppError::Validation(_)
            | AppError::Serialization(_) => ErrorKind::Validation,
            AppError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            AppError::AlreadyClosed(_)
            | AppError::BettingStillOpen { .. }
            | AppError::NotReady(_)
            | AppError::AlreadySettled(_)
            | AppError::InvalidState(_) => ErrorKind::State,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Unauthorized(_) => ErrorKind::Unauthorized,
            // a missing room key is treated like an outage: the watcher retries
            AppError::Decryption(_) | AppError::Custody(_) => ErrorKind::Transient,
            AppError::LedgerInvariantViolation(_) => ErrorKind::Fatal,
            AppError::Config(_) | AppError::Message(_) => ErrorKind::Internal,
        }
    }

    /// Whether the watcher may retry the operation on a later tick
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Check if error is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }

    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }
}

/// Convenience function to convert Option<T> to Result<T, AppError>
pub fn option_to_result<T>(opt: Option<T>, error_msg: &str) -> AppResult<T> {
    opt.ok_or_else(|| AppError::NotFound(error_msg.to_string()))
}
