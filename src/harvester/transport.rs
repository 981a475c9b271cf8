use std::time::Duration;

use reqwest::{Client, Url};
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::error::HarvestError;
use crate::oai::{ListRecordsArgs, OaiConfig};
use crate::xml::Element;

/// Upper bound for a single retry wait.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Exponential backoff: `base * 2^(attempt - 1)`, capped at [`MAX_BACKOFF`].
pub fn backoff_duration(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(MAX_BACKOFF)
}

/// Up to 10% extra wait so repeated failures do not land in lockstep.
fn with_jitter(wait: Duration) -> Duration {
    wait + wait.mul_f64(rand::random::<f64>() * 0.1)
}

/// Sequential ListRecords client with retries and a fair-use delay.
pub struct OaiClient {
    client: Client,
    endpoint: Url,
    delay: Duration,
    max_attempts: u32,
    retry_base_delay: Duration,
}

impl OaiClient {
    pub fn new(config: &OaiConfig) -> Result<Self, HarvestError> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|_| HarvestError::InvalidEndpoint(config.endpoint.clone()))?;

        let client = Client::builder()
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint,
            delay: config.delay,
            max_attempts: config.max_attempts.max(1),
            retry_base_delay: config.retry_base_delay,
        })
    }

    /// Issue one ListRecords request and parse the response.
    ///
    /// Transport failures are retried with exponential backoff up to the
    /// configured attempt count. A body that is not well-formed XML fails
    /// immediately.
    pub async fn list_records(&self, args: ListRecordsArgs<'_>) -> Result<Element, HarvestError> {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().extend_pairs(args.query());

        let mut attempt = 0;
        let body = loop {
            attempt += 1;
            match self.fetch(&url).await {
                Ok(body) => break body,
                Err(error) if !error.is_transient() => return Err(error),
                Err(error) if attempt < self.max_attempts => {
                    let wait = with_jitter(backoff_duration(self.retry_base_delay, attempt));
                    warn!(
                        "Attempt {}/{} for {} failed: {}; retrying in {:?}",
                        attempt, self.max_attempts, url, error, wait
                    );
                    sleep(wait).await;
                }
                Err(error) => {
                    return Err(HarvestError::RetriesExhausted {
                        attempts: attempt,
                        source: Box::new(error),
                    });
                }
            }
        };

        Element::parse(&body).inspect_err(|err| {
            error!("Unparseable response from {}: {}\n{}", url, err, body);
        })
    }

    async fn fetch(&self, url: &Url) -> Result<String, HarvestError> {
        debug!("GET {}", url);
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        let body = response.text().await;

        // Every response counts against the fair use policy, failed ones included.
        sleep(self.delay).await;

        if !status.is_success() {
            return Err(HarvestError::Status {
                status: status.as_u16(),
            });
        }

        Ok(body?)
    }
}
