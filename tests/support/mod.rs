#![allow(dead_code)]

use std::{
    collections::HashMap,
    env,
    path::PathBuf,
    sync::{
        Arc, Mutex, Once, OnceLock,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::Context;
use arxiv_harvester::{Harvester, OaiConfig};
use sqlx::{
    PgPool,
    migrate::Migrator,
    postgres::{PgConnectOptions, PgPoolOptions},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::{Mutex as TestLock, MutexGuard},
    task::JoinHandle,
};

pub const STANDARD_PAGE: &str = include_str!("../fixtures/standard_page.xml");
pub const FINAL_PAGE: &str = include_str!("../fixtures/final_page.xml");
pub const EDGE_PAGE: &str = include_str!("../fixtures/edge_page.xml");

pub const TOKEN: &str = "3132962";
pub const COMPLETE_LIST_SIZE: u64 = 1463679;

static MIGRATOR: Migrator = sqlx::migrate!();
static TEST_COUNTER: AtomicUsize = AtomicUsize::new(1);

pub type QueryParams = HashMap<String, String>;

#[derive(Clone, Default)]
pub struct MockOaiConfig {
    /// Body for `verb=ListRecords&metadataPrefix=...`.
    pub first_page: String,
    /// Bodies for `resumptionToken=<token>|<cursor>`, keyed by cursor.
    pub pages: HashMap<u64, String>,
    /// Answer this many requests with 503 before serving anything.
    pub fail_first: usize,
    /// Answer every request with a body that is not XML.
    pub malformed: bool,
}

impl MockOaiConfig {
    /// Fresh listing serves the standard page, cursor 1001 the final page.
    pub fn two_pages() -> Self {
        Self {
            first_page: STANDARD_PAGE.to_string(),
            pages: HashMap::from([(1001, FINAL_PAGE.to_string())]),
            ..Default::default()
        }
    }

    /// Standard page, then a copy of it pointing at cursor 2002, then the final page.
    pub fn three_pages() -> Self {
        Self {
            first_page: STANDARD_PAGE.to_string(),
            pages: HashMap::from([
                (1001, page_with_next_cursor(2002)),
                (2002, FINAL_PAGE.to_string()),
            ]),
            ..Default::default()
        }
    }
}

pub struct MockOaiServer {
    pub endpoint: String,
    requests: Arc<Mutex<Vec<QueryParams>>>,
    handle: JoinHandle<()>,
}

impl MockOaiServer {
    /// Query parameters of every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<QueryParams> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.requests().len()
    }
}

impl Drop for MockOaiServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub fn page_with_next_cursor(cursor: u64) -> String {
    STANDARD_PAGE.replace(&format!("{TOKEN}|1001"), &format!("{TOKEN}|{cursor}"))
}

pub fn test_config(endpoint: &str) -> OaiConfig {
    OaiConfig {
        endpoint: endpoint.to_string(),
        delay: Duration::ZERO,
        max_attempts: 3,
        retry_base_delay: Duration::ZERO,
        timeout: Duration::from_secs(10),
        ..OaiConfig::default()
    }
}

pub fn test_harvester(endpoint: &str) -> anyhow::Result<Harvester> {
    Ok(Harvester::new(
        test_config(endpoint),
        Arc::new(AtomicBool::new(false)),
    )?)
}

pub async fn start_mock_oai_server(config: MockOaiConfig) -> anyhow::Result<MockOaiServer> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let address = listener.local_addr()?;
    let endpoint = format!("http://{}/oai2", address);
    let shared_config = Arc::new(config);
    let requests = Arc::new(Mutex::new(Vec::new()));
    let requests_for_task = requests.clone();

    let handle = tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(value) => value,
                Err(_) => break,
            };
            let config = shared_config.clone();
            let requests = requests_for_task.clone();
            tokio::spawn(async move {
                if let Err(error) = handle_connection(&mut socket, &config, &requests).await {
                    eprintln!("mock OAI server request handling failed: {}", error);
                }
            });
        }
    });

    Ok(MockOaiServer {
        endpoint,
        requests,
        handle,
    })
}

pub fn create_temp_dir(name: &str) -> anyhow::Result<PathBuf> {
    let path = unique_path(name);
    std::fs::create_dir_all(&path)?;
    Ok(path)
}

pub async fn setup_test_pool() -> anyhow::Result<PgPool> {
    load_test_env();
    let database_url =
        env::var("DATABASE_URL").context("DATABASE_URL was not found; expected .env.test")?;

    let pool = match PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
    {
        Ok(pool) => pool,
        Err(error) if error.to_string().contains("does not exist") => {
            ensure_test_database_exists(&database_url).await?;
            PgPoolOptions::new()
                .max_connections(5)
                .connect(&database_url)
                .await?
        }
        Err(error) => return Err(error.into()),
    };

    reset_test_database(&pool).await?;
    Ok(pool)
}

pub async fn acquire_test_lock() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<TestLock<()>> = OnceLock::new();
    LOCK.get_or_init(|| TestLock::new(())).lock().await
}

fn load_test_env() {
    static LOAD_ENV: Once = Once::new();
    LOAD_ENV.call_once(|| {
        let _ = dotenvy::from_filename_override(".env.test");
    });
}

async fn ensure_test_database_exists(database_url: &str) -> anyhow::Result<()> {
    let connect_options: PgConnectOptions = database_url.parse()?;
    let database_name = connect_options
        .get_database()
        .context("DATABASE_URL is missing a database name")?
        .to_string();
    let admin_pool = PgPoolOptions::new()
        .max_connections(1)
        .connect_with(connect_options.database("postgres"))
        .await?;

    let create_database_query =
        format!("CREATE DATABASE \"{}\"", database_name.replace('"', "\"\""));

    match sqlx::query(&create_database_query)
        .execute(&admin_pool)
        .await
    {
        Ok(_) => Ok(()),
        Err(error) => {
            if let Some(database_error) = error.as_database_error()
                && database_error.code().as_deref() == Some("42P04")
            {
                return Ok(());
            }
            Err(error.into())
        }
    }
}

async fn reset_test_database(pool: &PgPool) -> anyhow::Result<()> {
    MIGRATOR.undo(pool, 0).await?;
    MIGRATOR.run(pool).await?;
    Ok(())
}

fn unique_path(name: &str) -> PathBuf {
    let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    let pid = std::process::id();
    let dir_name = format!("arxiv-harvester-{name}-{pid}-{id}");
    env::temp_dir().join(dir_name)
}

async fn handle_connection(
    socket: &mut TcpStream,
    config: &MockOaiConfig,
    requests: &Mutex<Vec<QueryParams>>,
) -> anyhow::Result<()> {
    let mut buf = vec![0u8; 8192];
    let mut total = 0usize;

    loop {
        let bytes_read = socket.read(&mut buf[total..]).await?;
        if bytes_read == 0 {
            return Ok(());
        }
        total += bytes_read;
        if buf[..total].windows(4).any(|window| window == b"\r\n\r\n") {
            break;
        }
        if total == buf.len() {
            break;
        }
    }

    let request = String::from_utf8_lossy(&buf[..total]);
    let request_line = request.lines().next().unwrap_or_default();
    let path = request_line.split_whitespace().nth(1).unwrap_or("/");
    let params = parse_query_params(path);

    let seen = {
        let mut requests = requests
            .lock()
            .map_err(|_| anyhow::anyhow!("request log poisoned"))?;
        requests.push(params.clone());
        requests.len()
    };

    let (status, body) = if seen <= config.fail_first {
        ("503 Service Unavailable", "Retry later".to_string())
    } else if config.malformed {
        ("200 OK", "<OAI-PMH><ListRecords>".to_string())
    } else {
        ("200 OK", build_oai_response(config, &params))
    };

    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/xml; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );

    socket.write_all(response.as_bytes()).await?;
    Ok(())
}

fn parse_query_params(path: &str) -> QueryParams {
    let mut params = HashMap::new();
    let query = path.split_once('?').map(|(_, query)| query).unwrap_or("");
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        params.insert(percent_decode(key), percent_decode(value));
    }
    params
}

fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => decoded.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                let high = (bytes[i + 1] as char).to_digit(16);
                let low = (bytes[i + 2] as char).to_digit(16);
                match (high, low) {
                    (Some(high), Some(low)) => {
                        decoded.push((high * 16 + low) as u8);
                        i += 2;
                    }
                    _ => decoded.push(b'%'),
                }
            }
            byte => decoded.push(byte),
        }
        i += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

fn build_oai_response(config: &MockOaiConfig, params: &QueryParams) -> String {
    if params.get("verb").map(String::as_str) != Some("ListRecords") {
        return error_response("badVerb", "Illegal verb");
    }

    match (params.get("metadataPrefix"), params.get("resumptionToken")) {
        (Some(_), None) => config.first_page.clone(),
        (None, Some(token)) => token
            .split_once('|')
            .and_then(|(_, cursor)| cursor.parse::<u64>().ok())
            .and_then(|cursor| config.pages.get(&cursor))
            .cloned()
            .unwrap_or_else(|| error_response("badResumptionToken", "Unknown resumptionToken")),
        _ => error_response("badArgument", "Illegal combination of arguments"),
    }
}

fn error_response(code: &str, message: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/">
  <responseDate>2018-06-27T16:00:00Z</responseDate>
  <request verb="ListRecords">http://export.arxiv.org/oai2</request>
  <error code="{code}">{message}</error>
</OAI-PMH>"#
    )
}
