use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::HarvestError;
use crate::harvester::authors::{SubRecord, group_fields};
use crate::oai::{ARXIV_NS, OAI_NS, list_records};
use crate::xml::Element;

/// The only accepted date layout.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Optional arXiv metadata fields read from each record, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataField {
    Id,
    Created,
    Updated,
    Title,
    Categories,
    JournalRef,
    Doi,
    MscClass,
    Abstract,
}

impl MetadataField {
    pub const ALL: [MetadataField; 9] = [
        MetadataField::Id,
        MetadataField::Created,
        MetadataField::Updated,
        MetadataField::Title,
        MetadataField::Categories,
        MetadataField::JournalRef,
        MetadataField::Doi,
        MetadataField::MscClass,
        MetadataField::Abstract,
    ];

    /// Element name in the arXiv schema.
    pub fn tag(self) -> &'static str {
        match self {
            MetadataField::Id => "id",
            MetadataField::Created => "created",
            MetadataField::Updated => "updated",
            MetadataField::Title => "title",
            MetadataField::Categories => "categories",
            MetadataField::JournalRef => "journal-ref",
            MetadataField::Doi => "doi",
            MetadataField::MscClass => "msc-class",
            MetadataField::Abstract => "abstract",
        }
    }

    /// Output key: the tag with hyphens turned into underscores.
    pub fn key(self) -> &'static str {
        match self {
            MetadataField::JournalRef => "journal_ref",
            MetadataField::MscClass => "msc_class",
            other => other.tag(),
        }
    }
}

/// One harvested article. Optional members are `None` when the source did
/// not supply them (or, for dates, supplied something that is not a date).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArticleRecord {
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datestamp: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msc_class: Option<String>,
    #[serde(rename = "abstract", skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<SubRecord>>,
}

impl ArticleRecord {
    pub fn new(identifier: &str, datestamp: Option<&str>) -> Self {
        Self {
            identifier: identifier.to_string(),
            datestamp: datestamp.and_then(|text| parse_date(identifier, "datestamp", text)),
            ..Default::default()
        }
    }

    fn assign(&mut self, field: MetadataField, text: &str) {
        let value = Some(text.to_string());
        match field {
            MetadataField::Id => self.id = value,
            MetadataField::Created => {
                self.created = parse_date(&self.identifier, field.tag(), text)
            }
            MetadataField::Updated => {
                self.updated = parse_date(&self.identifier, field.tag(), text)
            }
            MetadataField::Title => self.title = value,
            MetadataField::Categories => self.categories = Some(split_categories(text)),
            MetadataField::JournalRef => self.journal_ref = value,
            MetadataField::Doi => self.doi = value,
            MetadataField::MscClass => self.msc_class = value,
            MetadataField::Abstract => self.abstract_text = value,
        }
    }
}

/// Parse a `YYYY-MM-DD` date; anything else is dropped.
pub fn parse_date(identifier: &str, field: &str, text: &str) -> Option<NaiveDate> {
    if !is_date_shaped(text) {
        debug!(
            "Dropping {} {:?} for article {}: not a YYYY-MM-DD date",
            field, text, identifier
        );
        return None;
    }

    match NaiveDate::parse_from_str(text, DATE_FORMAT) {
        Ok(date) => Some(date),
        Err(err) => {
            debug!(
                "Dropping {} {:?} for article {}: {}",
                field, text, identifier, err
            );
            None
        }
    }
}

/// A four-digit year followed by nothing but digits and hyphens. chrono would
/// otherwise accept a sign or leading whitespace before the year.
fn is_date_shaped(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.len() > 4
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[4] == b'-'
        && bytes.iter().all(|byte| byte.is_ascii_digit() || *byte == b'-')
}

/// Category tags, split on single spaces with order kept.
pub fn split_categories(text: &str) -> Vec<String> {
    text.split(' ').map(str::to_string).collect()
}

/// Extract every `<record>` of a ListRecords page.
pub fn extract(root: &Element) -> Result<Vec<ArticleRecord>, HarvestError> {
    list_records(root)?
        .children(OAI_NS, "record")
        .map(extract_record)
        .collect()
}

fn extract_record(entry: &Element) -> Result<ArticleRecord, HarvestError> {
    let header = entry
        .child(OAI_NS, "header")
        .ok_or(HarvestError::MissingElement("header"))?;
    let identifier = header
        .child(OAI_NS, "identifier")
        .and_then(Element::text)
        .map(str::trim)
        .filter(|identifier| !identifier.is_empty())
        .ok_or(HarvestError::MissingIdentifier)?;
    let datestamp = header.child(OAI_NS, "datestamp").and_then(Element::text);
    debug!("article {} datestamp: {:?}", identifier, datestamp);

    let mut record = ArticleRecord::new(identifier, datestamp);

    let Some(metadata) = entry.child(OAI_NS, "metadata") else {
        warn!("No metadata for article {}", identifier);
        return Ok(record);
    };
    let Some(info) = metadata.child(ARXIV_NS, "arXiv") else {
        warn!("No arXiv metadata for article {}", identifier);
        return Ok(record);
    };

    for field in MetadataField::ALL {
        match info.child(ARXIV_NS, field.tag()).and_then(Element::text) {
            Some(text) => record.assign(field, text),
            None => debug!("{} not found in article {}", field.tag(), identifier),
        }
    }

    // Title trimming and author collection only happen for categorised records.
    if record.categories.is_some() {
        record.title = record.title.map(|title| title.trim().to_string());
        record.authors = Some(group_fields(info, ARXIV_NS, "author"));
    }

    Ok(record)
}
