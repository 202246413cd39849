use thiserror::Error;

/// Failures the pipeline reports to the operator.
///
/// Only `Config` and a startup `Connection` failure end the run; everything
/// else is reported and degrades to a fallback.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to connect to Jira: {0}")]
    Connection(String),

    #[error("Failed to list {what}: {message}")]
    Listing { what: &'static str, message: String },

    #[error("Failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("Story extraction failed: {0}")]
    Extraction(String),

    #[error("Failed to create issue: {0}")]
    Creation(String),
}

impl PipelineError {
    /// Whether the run cannot continue after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::Config(_) | PipelineError::Connection(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_fatal() {
        assert!(PipelineError::Connection("401".to_string()).is_fatal());
        assert!(PipelineError::Config("JIRA_URL".to_string()).is_fatal());
        assert!(!PipelineError::Creation("400".to_string()).is_fatal());
        assert!(!PipelineError::Listing {
            what: "projects",
            message: "timeout".to_string()
        }
        .is_fatal());
    }

    #[test]
    fn test_display_includes_context() {
        let err = PipelineError::Fetch {
            url: "https://example.com".to_string(),
            message: "HTTP 404".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to fetch https://example.com: HTTP 404");
    }
}
