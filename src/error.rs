//! Error types for the search pipeline.
//!
//! Only [`Error::InvalidRequest`] and [`Error::Search`] ever escape
//! [`crate::pipeline::Pipeline::search`]. Everything else is absorbed by the
//! orchestrator and surfaced as a warning.

/// Errors produced by the Are.na clients, the image fetcher and the scorer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The caller-supplied search request is unusable.
    #[error("invalid search request: {0}")]
    InvalidRequest(String),

    /// The channel search failed. Fatal for the whole invocation.
    #[error("channel search failed: {0}")]
    Search(String),

    /// Listing one channel's contents failed.
    #[error("channel contents failed: {0}")]
    Channel(String),

    /// Downloading an image failed.
    #[error("image fetch failed: {0}")]
    Fetch(String),

    /// One inference attempt failed. The message is shown to users as-is.
    #[error("{0}")]
    Inference(String),

    /// Image bytes could not be decoded.
    #[error("image decode failed: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Render a ureq failure the way the inference and Are.na warnings show it:
/// status code plus response body for HTTP errors, the transport message
/// otherwise.
pub(crate) fn describe_ureq(err: ureq::Error) -> String {
    match err {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            format!("HTTP {}: {}", code, body.trim())
        }
        ureq::Error::Transport(transport) => transport.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_search() {
        let err = Error::Search("HTTP 500: boom".into());
        assert_eq!(err.to_string(), "channel search failed: HTTP 500: boom");
    }

    #[test]
    fn display_inference_is_verbatim() {
        let err = Error::Inference("CLIP error 503: loading".into());
        assert_eq!(err.to_string(), "CLIP error 503: loading");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
