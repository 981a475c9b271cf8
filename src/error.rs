use thiserror::Error;

/// Failures raised while harvesting a ListRecords listing.
///
/// Only transport-level failures (`Http`, `Status`) are retried by the
/// client. Everything else is fatal for the harvest run.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("invalid OAI endpoint {0:?}")]
    InvalidEndpoint(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("OAI endpoint returned HTTP {status}")]
    Status { status: u16 },

    #[error("request failed after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<HarvestError>,
    },

    #[error("malformed XML response: {message}")]
    MalformedXml { message: String },

    #[error("OAI-PMH error {code}: {message}")]
    Oai { code: String, message: String },

    #[error("response is missing the <{0}> element")]
    MissingElement(&'static str),

    #[error("resumptionToken has no completeListSize attribute")]
    MissingCompleteListSize,

    #[error("invalid resumptionToken {0:?}")]
    InvalidResumptionToken(String),

    #[error("record header has no identifier")]
    MissingIdentifier,

    #[error("invalid author blob: {0}")]
    Blob(#[from] serde_json::Error),
}

impl HarvestError {
    pub(crate) fn malformed(message: impl std::fmt::Display) -> Self {
        Self::MalformedXml {
            message: message.to_string(),
        }
    }

    /// Timeouts, connection failures and non-2xx responses.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Status { .. })
    }
}
