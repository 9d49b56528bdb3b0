use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown chat type: {0}")]
    UnknownChatKind(String),

    #[error("Unknown task status: {0}")]
    UnknownTaskStatus(String),

    #[error("Malformed realtime event: {0}")]
    Event(String),
}
