use tracing::info;

use crate::error::HarvestError;
use crate::harvester::Harvester;
use crate::harvester::extract::{ArticleRecord, extract};
use crate::oai::{
    ListRecordsArgs, resumption_element, resumption_text, resumption_token, token_cursor,
    token_prefix,
};
use crate::xml::Element;

/// Everything the fresh-listing request returns.
#[derive(Debug)]
pub struct ListingStart {
    /// Opaque part of the resumptionToken; empty for a single-page listing.
    pub token: String,
    pub complete_list_size: Option<u64>,
    pub records: Vec<ArticleRecord>,
    pub next_cursor: Option<u64>,
}

/// One page of a continued listing. `next_cursor` is `None` at end of data.
#[derive(Debug)]
pub struct Batch {
    pub records: Vec<ArticleRecord>,
    pub next_cursor: Option<u64>,
}

impl Harvester {
    async fn fresh_listing(&self) -> Result<Element, HarvestError> {
        let args = ListRecordsArgs::MetadataPrefix(&self.config.metadata_prefix);
        self.client.list_records(args).await
    }

    /// Size of the whole listing, from the first page's `completeListSize`.
    ///
    /// This fetches and throws away the first page of records; use
    /// [`Harvester::open_listing`] to keep it.
    pub async fn total_record_count(&self) -> Result<u64, HarvestError> {
        let root = self.fresh_listing().await?;
        complete_list_size(&root)?.ok_or(HarvestError::MissingCompleteListSize)
    }

    /// The opaque resumptionToken used to page through the listing.
    ///
    /// Like [`Harvester::total_record_count`], the first page of records is
    /// fetched and discarded.
    pub async fn request_initial_token(&self) -> Result<String, HarvestError> {
        let root = self.fresh_listing().await?;
        let text = resumption_text(&root)?
            .ok_or(HarvestError::MissingElement("resumptionToken"))?;
        let token = token_prefix(text).to_string();
        info!("resumptionToken: {}", token);
        Ok(token)
    }

    /// Start a listing with one request, keeping the first page, the count
    /// and the token together.
    pub async fn open_listing(&self) -> Result<ListingStart, HarvestError> {
        let root = self.fresh_listing().await?;
        let records = extract(&root)?;
        let text = resumption_text(&root)?;
        let next_cursor = text.map(token_cursor).transpose()?;

        Ok(ListingStart {
            token: text.map(token_prefix).unwrap_or_default().to_string(),
            complete_list_size: complete_list_size(&root)?,
            records,
            next_cursor,
        })
    }

    /// Fetch the page at `cursor` and the cursor of the page after it.
    pub async fn fetch_batch(&self, token: &str, cursor: u64) -> Result<Batch, HarvestError> {
        let resumption = resumption_token(token, cursor);
        let root = self
            .client
            .list_records(ListRecordsArgs::ResumptionToken(&resumption))
            .await?;
        let records = extract(&root)?;

        let next_cursor = match resumption_text(&root)? {
            Some(text) => {
                let next = token_cursor(text)?;
                info!("next resumptionCursor: {}", next);
                Some(next)
            }
            None => {
                info!("End of data");
                None
            }
        };

        Ok(Batch {
            records,
            next_cursor,
        })
    }
}

fn complete_list_size(root: &Element) -> Result<Option<u64>, HarvestError> {
    let Some(token) = resumption_element(root)? else {
        return Ok(None);
    };
    let Some(size) = token.attribute("completeListSize") else {
        return Ok(None);
    };

    match size.trim().parse() {
        Ok(size) => Ok(Some(size)),
        Err(_) => {
            let message = format!("invalid completeListSize {size:?}");
            Err(HarvestError::malformed(message))
        }
    }
}
