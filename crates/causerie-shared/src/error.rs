use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid channel id: {0}")]
    InvalidChannelId(String),

    #[error("Invalid channel header {id}: {reason}")]
    InvalidHeader { id: String, reason: String },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(#[from] chrono::ParseError),

    #[error("Malformed payload: {0}")]
    Payload(#[from] serde_json::Error),
}
