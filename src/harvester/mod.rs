pub mod authors;
pub mod cli;
pub mod extract;
pub mod listing;
pub mod output;
pub mod transport;

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use tracing::{info, warn};

use crate::error::HarvestError;
use crate::oai::OaiConfig;

use authors::{AuthorRow, normalize_records};
use extract::ArticleRecord;
use listing::ListingStart;
use transport::OaiClient;

/// Position to pick an interrupted harvest back up from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resume {
    pub token: String,
    pub cursor: u64,
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub resume: Option<Resume>,
    /// Stop after this many pages, the opening page included.
    pub max_pages: Option<NonZeroUsize>,
}

/// Records and author rows accumulated by one harvest run.
#[derive(Debug, Default)]
pub struct HarvestOutcome {
    pub token: String,
    pub complete_list_size: Option<u64>,
    pub articles: Vec<ArticleRecord>,
    pub authors: Vec<AuthorRow>,
    pub pages: usize,
    /// Cursor of the first page not fetched; `None` once the listing is exhausted.
    pub next_cursor: Option<u64>,
}

impl HarvestOutcome {
    pub fn is_complete(&self) -> bool {
        self.next_cursor.is_none()
    }

    /// Where to continue when the run stopped early.
    pub fn resume(&self) -> Option<Resume> {
        self.next_cursor.map(|cursor| Resume {
            token: self.token.clone(),
            cursor,
        })
    }
}

impl From<ListingStart> for HarvestOutcome {
    fn from(start: ListingStart) -> Self {
        Self {
            token: start.token,
            complete_list_size: start.complete_list_size,
            articles: start.records,
            authors: Vec::new(),
            pages: 1,
            next_cursor: start.next_cursor,
        }
    }
}

impl From<Resume> for HarvestOutcome {
    fn from(resume: Resume) -> Self {
        Self {
            token: resume.token,
            next_cursor: Some(resume.cursor),
            ..Default::default()
        }
    }
}

pub struct Harvester {
    client: OaiClient,
    config: OaiConfig,
    shutdown: Arc<AtomicBool>,
}

impl Harvester {
    pub fn new(config: OaiConfig, shutdown: Arc<AtomicBool>) -> Result<Self, HarvestError> {
        let client = OaiClient::new(&config)?;
        Ok(Self {
            client,
            config,
            shutdown,
        })
    }

    /// Page through the listing until end of data, the page limit, or a
    /// shutdown request, then normalise the authors of everything fetched.
    pub async fn run(&self, options: RunOptions) -> anyhow::Result<HarvestOutcome> {
        let mut outcome = match options.resume {
            Some(resume) => {
                info!("Resuming harvest at cursor {}", resume.cursor);
                HarvestOutcome::from(resume)
            }
            None => {
                let start = self
                    .open_listing()
                    .await
                    .context("Failed to open the ListRecords listing")?;
                if let Some(size) = start.complete_list_size {
                    info!("Listing holds {} records", size);
                }
                info!("Page 1: {} records", start.records.len());
                HarvestOutcome::from(start)
            }
        };

        while let Some(cursor) = outcome.next_cursor {
            if self.shutdown.load(Ordering::Relaxed) {
                warn!(
                    "Harvest interrupted; resume with token {} at cursor {}",
                    outcome.token, cursor
                );
                break;
            }
            if options.max_pages.is_some_and(|max| outcome.pages >= max.get()) {
                info!("Reached the limit of {} page(s)", outcome.pages);
                break;
            }

            let page = outcome.pages + 1;
            let batch = self
                .fetch_batch(&outcome.token, cursor)
                .await
                .with_context(|| format!("Failed to fetch page {} at cursor {}", page, cursor))?;
            info!("Page {}: {} records", page, batch.records.len());

            outcome.articles.extend(batch.records);
            outcome.pages = page;
            outcome.next_cursor = batch.next_cursor;
        }

        outcome.authors = normalize_records(&outcome.articles);
        info!(
            "Harvested {} articles and {} authors over {} page(s)",
            outcome.articles.len(),
            outcome.authors.len(),
            outcome.pages
        );
        Ok(outcome)
    }
}

/// Expand `~` and environment variables in a user-supplied path.
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match shellexpand::full(&raw) {
        Ok(expanded) => PathBuf::from(expanded.into_owned()),
        Err(_) => path.to_path_buf(),
    }
}
