/// One signing identity per network. The agent signs every EscrowFinish it
/// submits with the credential matching the record's network.
#[derive(Debug, Clone)]
pub struct NetworkCredential {
    pub address: String,
    pub secret: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,
    /// JSON-RPC endpoints. Submissions use the endpoint's sign-and-submit
    /// mode, which sends the signing secret along, so both endpoints must be
    /// rippled instances the operator trusts with that secret (in practice a
    /// self-hosted one). The public-cluster defaults are only suitable for
    /// read paths.
    pub xrpl_endpoint: String,
    pub xrpl_test_endpoint: String,
    pub production_credential: NetworkCredential,
    pub test_credential: NetworkCredential,
    /// Optional outbound proxy for all ledger traffic
    pub proxy_url: Option<String>,
    /// Account whose historical escrow objects the backfill walks
    pub watched_account: String,
    /// Destination tag marking an escrow as addressed to this agent
    pub destination_tag_sentinel: u32,
    pub scan_interval_minutes: u32,
    pub due_skew_minutes: i64,
    pub backfill_page_limit: u32,
    pub ledger_timeout_secs: u64,
    pub backfill_on_start: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let production_address = required("XRPL_ADDRESS")?;
        let production_secret = required("XRPL_SECRET")?;

        // The test network falls back to the production identity when no
        // dedicated credential is configured.
        let test_address =
            std::env::var("XRPL_TEST_ADDRESS").unwrap_or_else(|_| production_address.clone());
        let test_secret =
            std::env::var("XRPL_TEST_SECRET").unwrap_or_else(|_| production_secret.clone());

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/escrow_agent".to_string()),
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:4021".to_string()),
            xrpl_endpoint: std::env::var("XRPL_ENDPOINT")
                .unwrap_or_else(|_| "https://s2.ripple.com:51234".to_string()),
            xrpl_test_endpoint: std::env::var("XRPL_TEST_ENDPOINT")
                .unwrap_or_else(|_| "https://s.altnet.rippletest.net:51234".to_string()),
            production_credential: NetworkCredential {
                address: production_address,
                secret: production_secret,
            },
            test_credential: NetworkCredential {
                address: test_address,
                secret: test_secret,
            },
            proxy_url: std::env::var("XRPL_PROXY_URL").ok(),
            watched_account: std::env::var("WATCHED_ACCOUNT")
                .unwrap_or_else(|_| "rPEPPER7kfTD9w2To4CQk6UCfuHM9c6GDY".to_string()),
            destination_tag_sentinel: env_or("DESTINATION_TAG_SENTINEL", 1),
            scan_interval_minutes: env_or("SCAN_INTERVAL_MINUTES", 5),
            due_skew_minutes: env_or("DUE_SKEW_MINUTES", 5),
            backfill_page_limit: env_or("BACKFILL_PAGE_LIMIT", 1000),
            ledger_timeout_secs: env_or("LEDGER_TIMEOUT_SECS", 30),
            backfill_on_start: env_or("BACKFILL_ON_START", false),
        })
    }
}

fn required(name: &str) -> Result<String, config::ConfigError> {
    std::env::var(name).map_err(|_| config::ConfigError::Message(format!("{} must be set", name)))
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
