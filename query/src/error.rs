use eventlens_core::error::{ErrorCode, EventlensError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid search input: {0}")]
    Input(String),
    #[error("storage failure: {0}")]
    Storage(#[from] storage::StorageError),
    #[error("ai failure: {0}")]
    Ai(#[from] slm::AiError),
    #[error("search cancelled")]
    Cancelled,
}

impl EventlensError for SearchError {
    fn error_code(&self) -> ErrorCode {
        match self {
            SearchError::Input(_) => ErrorCode::InvalidArgument,
            SearchError::Storage(_) => ErrorCode::Storage,
            SearchError::Ai(_) => ErrorCode::Ai,
            SearchError::Cancelled => ErrorCode::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_map_per_kind() {
        assert_eq!(
            SearchError::Input("bad".to_string()).error_code(),
            ErrorCode::InvalidArgument
        );
        assert_eq!(SearchError::Cancelled.error_code(), ErrorCode::Cancelled);

        let storage: SearchError = storage::StorageError::Vector("down".to_string()).into();
        assert_eq!(storage.error_code(), ErrorCode::Storage);

        let ai: SearchError = slm::AiError::Chat("down".to_string()).into();
        assert_eq!(ai.error_code(), ErrorCode::Ai);
    }
}
