use thiserror::Error;

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(format!("JSON serialization error: {}", err))
    }
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(format!("I/O error: {}", err))
    }
}

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Chain integrity failure at block {index}: {reason}")]
    ChainIntegrity { index: u64, reason: String },

    #[error("Merkle proof mismatch for leaf {leaf_index}")]
    ProofMismatch { leaf_index: usize },

    #[error("Unauthorized transfer of {asset_id}: {claimed} is not the current owner ({actual})")]
    UnauthorizedTransfer {
        asset_id: String,
        claimed: String,
        actual: String,
    },

    #[error("Cannot append to sealed batch {seq}")]
    SealedBatchAppend { seq: u64 },

    #[error("Asset not registered: {0}")]
    UnknownAsset(String),

    #[error("Cannot build a commitment over an empty batch")]
    EmptyBatch,

    #[error("Leaf index {index} out of range for batch of {len} events")]
    LeafIndexOutOfRange { index: usize, len: usize },

    #[error("Invalid audit event: {0}")]
    InvalidEvent(String),

    #[error("Anchor store operation failed after {attempts} attempts: {reason}")]
    AnchorFailed { attempts: u32, reason: String },

    #[error("No committed batch for block {0}")]
    UnknownBlock(u64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl ChainError {
    /// True when the error poisons the chain instance: appends must be
    /// refused until the underlying storage is repaired.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ChainIntegrity { .. })
    }
}
