use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrowserlessError>;

#[derive(Debug, Error)]
pub enum BrowserlessError {
    #[error("Client setup error: {0}")]
    Setup(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Navigation timed out")]
    Timeout,

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

impl BrowserlessError {
    /// Whether retrying the same navigation might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            BrowserlessError::Network(_) | BrowserlessError::Timeout => true,
            BrowserlessError::Api { status, .. } => *status == 429 || *status >= 500,
            BrowserlessError::Setup(_) => false,
        }
    }
}

impl From<reqwest::Error> for BrowserlessError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BrowserlessError::Timeout
        } else {
            BrowserlessError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limits_and_server_errors_are_transient() {
        let limited = BrowserlessError::Api {
            status: 429,
            message: String::new(),
        };
        let broken = BrowserlessError::Api {
            status: 503,
            message: String::new(),
        };
        assert!(limited.is_transient());
        assert!(broken.is_transient());
        assert!(BrowserlessError::Timeout.is_transient());
    }

    #[test]
    fn client_errors_are_not_transient() {
        let bad = BrowserlessError::Api {
            status: 400,
            message: "bad url".into(),
        };
        assert!(!bad.is_transient());
        assert!(!BrowserlessError::Setup("tls".into()).is_transient());
    }
}
