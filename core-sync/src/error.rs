use bridge_traits::error::BridgeError;
use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Parent-reference structure violates the expected shape
    #[error("Malformed parent tree: {0}")]
    MalformedParentTree(String),

    /// Parent tree resolved but lacks a relation the content type requires
    #[error("Parent tree has no '{relation}' entry")]
    MissingRelation { relation: String },

    #[error("Record {external_id} has no local record yet and no parent was supplied")]
    MissingRequiredParent { external_id: String },

    #[error("Persistence error: {0}")]
    Persistence(#[from] LibraryError),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Provider error: {0}")]
    Provider(#[from] BridgeError),

    #[error("Sync already in progress for {content_type}")]
    SyncInProgress { content_type: String },

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Errors that only concern one item; a pass counts them and moves on
    pub fn is_item_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedParentTree(_)
                | Self::MissingRelation { .. }
                | Self::MissingRequiredParent { .. }
                | Self::Persistence(_)
                | Self::Queue(_)
        )
    }

    /// Redelivering the item cannot succeed without outside intervention
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::MalformedParentTree(_)
                | Self::MissingRelation { .. }
                | Self::MissingRequiredParent { .. }
                | Self::Serialization(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
