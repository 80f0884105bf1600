use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnchorError {
    #[error("Insufficient funds at {address}: need {required}, have {available}")]
    InsufficientFunds {
        address: String,
        required: u128,
        available: u128,
    },

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Transaction payload does not match commitment: expected {expected}, found {found}")]
    UnverifiedTransaction { expected: String, found: String },

    #[error("Broadcast failed after {attempts} attempt(s): {last_error}")]
    Broadcast { attempts: u32, last_error: String },

    #[error("Providers returned conflicting transaction ids {first} and {second}")]
    ConflictingResult { first: String, second: String },

    #[error("Invalid transaction id from {provider}: {tx_id}")]
    InvalidTransactionId { provider: String, tx_id: String },

    #[error("Merkle tree has not been populated")]
    TreeNotPopulated,

    #[error("Batch contains no documents")]
    EmptyBatch,

    #[error("Leaf index {index} out of range for {count} leaves")]
    LeafIndexOutOfRange { index: usize, count: usize },

    #[error("Duplicate document uid: {0}")]
    DuplicateDocument(String),

    #[error("Signer is {actual}, expected {expected}")]
    SignerState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Key medium error: {0}")]
    KeyMedium(String),

    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Provider {provider} failed: {message}")]
    Provider { provider: String, message: String },

    #[error("Operation cancelled while {0}")]
    Cancelled(String),

    #[error("Timed out after {secs}s while {during}")]
    Timeout { during: String, secs: u64 },

    #[error("Invalid proof: {0}")]
    InvalidProof(String),

    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AnchorError {
    pub(crate) fn provider(provider: &str, message: impl ToString) -> Self {
        Self::Provider {
            provider: provider.to_string(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AnchorError>;
