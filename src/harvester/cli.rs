use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::harvester::{Resume, RunOptions};
use crate::oai::{DEFAULT_ENDPOINT, DEFAULT_METADATA_PREFIX, OaiConfig};

#[derive(Debug, Args)]
pub struct OaiArgs {
    /// OAI endpoint url
    #[arg(long, default_value = DEFAULT_ENDPOINT, env = "OAI_ENDPOINT")]
    pub endpoint: String,

    /// OAI metadata prefix
    #[arg(short, long, default_value = DEFAULT_METADATA_PREFIX, env = "METADATA_PREFIX")]
    pub metadata_prefix: String,

    /// Seconds to wait after every request (fair use)
    #[arg(long, default_value_t = 10, env = "OAI_DELAY")]
    pub delay: u64,

    /// Attempts per request before giving up
    #[arg(long, default_value_t = 10, env = "OAI_MAX_ATTEMPTS")]
    pub max_attempts: u32,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 60, env = "OAI_TIMEOUT")]
    pub timeout: u64,
}

impl OaiArgs {
    pub fn config(&self) -> OaiConfig {
        OaiConfig {
            endpoint: self.endpoint.clone(),
            metadata_prefix: self.metadata_prefix.clone(),
            delay: Duration::from_secs(self.delay),
            max_attempts: self.max_attempts,
            timeout: Duration::from_secs(self.timeout),
            ..OaiConfig::default()
        }
    }
}

#[derive(Debug, Args)]
pub struct HarvesterArgs {
    #[command(flatten)]
    pub oai: OaiArgs,

    /// Resumption token of an interrupted harvest
    #[arg(long, requires = "cursor")]
    pub token: Option<String>,

    /// Cursor to resume the interrupted harvest from
    #[arg(long, requires = "token")]
    pub cursor: Option<u64>,

    /// Stop after this many pages (at least 1)
    #[arg(long)]
    pub max_pages: Option<NonZeroUsize>,

    /// Directory for articles.json and authors.json
    #[arg(short, long, env = "OUTPUT_DIR")]
    pub output: Option<PathBuf>,
}

impl HarvesterArgs {
    pub fn run_options(&self) -> RunOptions {
        let resume = match (&self.token, self.cursor) {
            (Some(token), Some(cursor)) => Some(Resume {
                token: token.clone(),
                cursor,
            }),
            _ => None,
        };

        RunOptions {
            resume,
            max_pages: self.max_pages,
        }
    }
}
