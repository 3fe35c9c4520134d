//! Error-code contract shared by every component error type.

/// Grepable error code and retryable flag for errors surfaced to the UI layer.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}
