use thiserror::Error;

/// Message shown when a request never received a response.
pub const NETWORK_FAILURE: &str = "네트워크 오류가 발생했습니다.";

/// Message shown when a new chat question is submitted before the previous answer arrived.
pub const CHAT_PENDING: &str = "이전 질문에 대한 답변을 기다리는 중입니다.";

/// Message shown when an empty chat question is submitted.
pub const EMPTY_QUESTION: &str = "질문을 입력해주세요.";

/// Error type for query and mutation operations.
///
/// Every variant renders as a message that can be shown to the user as is;
/// nothing beyond that message is expected to reach the view layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// No response was received from the backend.
    #[error("{0}")]
    NetworkError(String),

    /// The backend answered with a non-success status.
    #[error("{message}")]
    ServerError { status: u16, message: String },

    /// The backend answered successfully but the body did not decode.
    #[error("{0}")]
    DecodeError(String),

    /// The cache could not satisfy the request (no fetcher, type mismatch, task failure).
    #[error("Fetch failed: {0}")]
    FetchError(String),

    /// The in-flight fetch was cancelled before it completed.
    #[error("request cancelled")]
    Cancelled,

    /// A previous exclusive mutation is still pending.
    #[error("{}", CHAT_PENDING)]
    Busy,

    /// A chat question was empty after trimming.
    #[error("{}", EMPTY_QUESTION)]
    EmptyQuestion,
}

impl QueryError {
    /// The transport-level failure with its fixed message.
    pub fn network() -> Self {
        Self::NetworkError(NETWORK_FAILURE.to_owned())
    }

    /// Returns the display-ready message for this error.
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Returns the HTTP status when the backend rejected the request.
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::ServerError { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_error_uses_fixed_message() {
        let err = QueryError::network();
        assert_eq!(err.message(), "네트워크 오류가 발생했습니다.");
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_server_error_display() {
        let err = QueryError::ServerError {
            status: 404,
            message: "게시글을 찾을 수 없습니다.".to_string(),
        };
        assert_eq!(err.to_string(), "게시글을 찾을 수 없습니다.");
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn test_query_error_display() {
        let err = QueryError::FetchError("test error".to_string());
        assert_eq!(err.to_string(), "Fetch failed: test error");

        assert_eq!(QueryError::Busy.message(), CHAT_PENDING);
        assert_eq!(QueryError::EmptyQuestion.message(), EMPTY_QUESTION);
        assert!(QueryError::Cancelled.is_cancelled());
    }
}
