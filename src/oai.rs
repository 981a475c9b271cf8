use std::time::Duration;

use crate::error::HarvestError;
use crate::xml::Element;

/// OAI-PMH envelope namespace.
pub const OAI_NS: &str = "http://www.openarchives.org/OAI/2.0/";

/// arXiv metadata schema namespace.
pub const ARXIV_NS: &str = "http://arxiv.org/OAI/arXiv/";

pub const DEFAULT_ENDPOINT: &str = "http://export.arxiv.org/oai2";
pub const DEFAULT_METADATA_PREFIX: &str = "arXiv";

/// Every request issued by the harvester uses this verb.
pub const VERB: &str = "ListRecords";

/// Separates the opaque token from the record offset in a resumptionToken.
pub const TOKEN_DELIMITER: char = '|';

#[derive(Debug, Clone)]
pub struct OaiConfig {
    pub endpoint: String,
    pub metadata_prefix: String,
    /// Pause after every response, for the endpoint's fair use policy.
    pub delay: Duration,
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
    pub timeout: Duration,
}

impl Default for OaiConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            metadata_prefix: DEFAULT_METADATA_PREFIX.to_string(),
            delay: Duration::from_secs(10),
            max_attempts: 10,
            retry_base_delay: Duration::from_secs(1),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Arguments accompanying the ListRecords verb: a fresh listing or a
/// continuation, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListRecordsArgs<'a> {
    MetadataPrefix(&'a str),
    ResumptionToken(&'a str),
}

impl<'a> ListRecordsArgs<'a> {
    pub fn query(&self) -> [(&'static str, &'a str); 2] {
        match *self {
            ListRecordsArgs::MetadataPrefix(prefix) => {
                [("verb", VERB), ("metadataPrefix", prefix)]
            }
            ListRecordsArgs::ResumptionToken(token) => {
                [("verb", VERB), ("resumptionToken", token)]
            }
        }
    }
}

/// Join an opaque token and a record offset into a resumptionToken value.
pub fn resumption_token(token: &str, cursor: u64) -> String {
    format!("{token}{TOKEN_DELIMITER}{cursor}")
}

/// The opaque part of a resumptionToken, up to the first delimiter.
pub fn token_prefix(text: &str) -> &str {
    text.split(TOKEN_DELIMITER).next().unwrap_or(text)
}

/// The record offset carried after the first delimiter.
pub fn token_cursor(text: &str) -> Result<u64, HarvestError> {
    text.split(TOKEN_DELIMITER)
        .nth(1)
        .and_then(|cursor| cursor.trim().parse().ok())
        .ok_or_else(|| HarvestError::InvalidResumptionToken(text.to_string()))
}

/// The `<ListRecords>` element of a response, surfacing OAI-PMH protocol
/// errors (`badResumptionToken`, `noRecordsMatch`, ...) first.
pub fn list_records(root: &Element) -> Result<&Element, HarvestError> {
    if let Some(error) = root.child(OAI_NS, "error") {
        return Err(HarvestError::Oai {
            code: error.attribute("code").unwrap_or("unknown").to_string(),
            message: error.text().unwrap_or_default().trim().to_string(),
        });
    }

    root.child(OAI_NS, "ListRecords")
        .ok_or(HarvestError::MissingElement("ListRecords"))
}

/// The `<resumptionToken>` element of a ListRecords response, if any.
pub fn resumption_element(root: &Element) -> Result<Option<&Element>, HarvestError> {
    Ok(list_records(root)?.child(OAI_NS, "resumptionToken"))
}

/// Non-empty resumptionToken text; `None` signals the end of the listing.
pub fn resumption_text(root: &Element) -> Result<Option<&str>, HarvestError> {
    Ok(resumption_element(root)?
        .and_then(Element::text)
        .map(str::trim)
        .filter(|text| !text.is_empty()))
}
