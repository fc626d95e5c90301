use thiserror::Error;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("chat request failed: {0}")]
    Chat(String),
    #[error("embedding request failed: {0}")]
    Embedding(String),
    #[error("model returned malformed payload: {0}")]
    MalformedResponse(String),
    #[error("http transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for AiError {
    fn from(err: reqwest::Error) -> Self {
        AiError::Transport(err.to_string())
    }
}
