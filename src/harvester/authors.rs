//! Repeated sub-element groups (authors) and their normalisation into rows.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::HarvestError;
use crate::harvester::extract::ArticleRecord;
use crate::xml::Element;

/// Author fields kept by [`normalize`]; anything else is dropped.
pub const AUTHOR_FIELDS: [&str; 2] = ["keyname", "forenames"];

/// Field name to text mapping for one matched sub-element, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubRecord {
    fields: Vec<(String, Option<String>)>,
}

impl SubRecord {
    /// Set a field, replacing an earlier value for the same name in place.
    pub fn insert(&mut self, name: &str, value: Option<&str>) {
        let value = value.map(str::to_string);
        match self.fields.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .and_then(|(_, value)| value.as_deref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|(key, _)| key == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(key, _)| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for SubRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SubRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SubRecordVisitor;

        impl<'de> Visitor<'de> for SubRecordVisitor {
            type Value = SubRecord;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of field names to strings or nulls")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<SubRecord, A::Error> {
                let mut record = SubRecord::default();
                while let Some((key, value)) = access.next_entry::<String, Option<String>>()? {
                    record.insert(&key, value.as_deref());
                }
                Ok(record)
            }
        }

        deserializer.deserialize_map(SubRecordVisitor)
    }
}

/// Collect every `tag` element under `element` (itself included) as a
/// [`SubRecord`] of its descendants' local names and texts. Nested elements
/// that carry `tag` themselves are left out of the mapping.
pub fn group_fields(element: &Element, namespace: &str, tag: &str) -> Vec<SubRecord> {
    element
        .find_all(namespace, tag)
        .map(|group| {
            let mut record = SubRecord::default();
            for field in group
                .descendants()
                .filter(|field| !field.is(namespace, tag))
            {
                record.insert(field.name(), field.text());
            }
            record
        })
        .collect()
}

/// [`group_fields`] serialised as one self-contained JSON blob.
pub fn encode(element: &Element, namespace: &str, tag: &str) -> Result<String, HarvestError> {
    encode_groups(&group_fields(element, namespace, tag))
}

pub fn encode_groups(groups: &[SubRecord]) -> Result<String, HarvestError> {
    Ok(serde_json::to_string(groups)?)
}

pub fn decode_groups(blob: &str) -> Result<Vec<SubRecord>, HarvestError> {
    Ok(serde_json::from_str(blob)?)
}

/// One author of one article. `(article_id, keyname, forenames)` is the
/// natural key in storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AuthorRow {
    pub article_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forenames: Option<String>,
}

impl AuthorRow {
    fn project(article_id: &str, author: &SubRecord) -> Self {
        let [keyname, forenames] = AUTHOR_FIELDS.map(|field| author.get(field).map(str::to_string));
        Self {
            article_id: article_id.to_string(),
            keyname,
            forenames,
        }
    }
}

/// Flatten `(article id, authors)` pairs into author rows, keeping input order.
pub fn normalize<'a, I>(pairs: I) -> Vec<AuthorRow>
where
    I: IntoIterator<Item = (&'a str, &'a [SubRecord])>,
{
    pairs
        .into_iter()
        .flat_map(|(article_id, authors)| {
            authors
                .iter()
                .map(move |author| AuthorRow::project(article_id, author))
        })
        .collect()
}

/// Author rows for extracted records; records without authors add none.
pub fn normalize_records(records: &[ArticleRecord]) -> Vec<AuthorRow> {
    normalize(records.iter().map(|record| {
        (
            record.identifier.as_str(),
            record.authors.as_deref().unwrap_or_default(),
        )
    }))
}

/// Like [`normalize`], for identifiers paired by position with encoded blobs.
pub fn normalize_encoded<I, B>(
    identifiers: &[I],
    blobs: &[B],
) -> Result<Vec<AuthorRow>, HarvestError>
where
    I: AsRef<str>,
    B: AsRef<str>,
{
    let decoded = blobs
        .iter()
        .map(|blob| decode_groups(blob.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;

    let pairs = identifiers
        .iter()
        .map(|id| -> &str { id.as_ref() })
        .zip(decoded.iter().map(Vec::as_slice));
    Ok(normalize(pairs))
}
