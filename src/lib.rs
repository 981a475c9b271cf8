pub mod db;
pub mod error;
pub mod harvester;
pub mod oai;
pub mod xml;

pub use error::HarvestError;
pub use harvester::authors::{AuthorRow, SubRecord};
pub use harvester::cli::{HarvesterArgs, OaiArgs};
pub use harvester::extract::ArticleRecord;
pub use harvester::listing::{Batch, ListingStart};
pub use harvester::{HarvestOutcome, Harvester, Resume, RunOptions, expand_path};
pub use oai::OaiConfig;
