use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("message content is not a poll payload")]
    NotAPoll,
    #[error("invalid poll payload: {0}")]
    PollParse(#[from] serde_json::Error),
    #[error("message {0} not found in room history")]
    MessageNotFound(String),
    #[error("poll has no option {0}")]
    UnknownOption(String),
}
