//! Configuration for Watchtower
//!
//! CLI arguments and environment variable handling using clap.

use clap::{Parser, ValueEnum};

/// Watchtower - pending-signature inbox discovery daemon
///
/// Polls the ledger for transactions each registered user is eligible
/// to sign and keeps their inbox in the document store current.
#[derive(Parser, Debug, Clone)]
#[command(name = "watchtower")]
#[command(about = "Pending-signature inbox discovery daemon for Accumulate-style ledgers")]
pub struct Args {
    /// Ledger JSON-RPC endpoint
    #[arg(
        long,
        env = "ACCUMULATE_API_URL",
        default_value = "https://mainnet.accumulatenetwork.io/v3"
    )]
    pub api_url: String,

    /// Logical network tag
    #[arg(long, env = "ACCUMULATE_NETWORK", value_enum, default_value = "mainnet")]
    pub network: Network,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "watchtower")]
    pub mongodb_db: String,

    /// Collection holding user documents
    #[arg(long, env = "USERS_COLLECTION", default_value = "users")]
    pub users_collection: String,

    /// Seconds between discovery cycles
    #[arg(long, env = "POLL_INTERVAL_SEC", default_value = "600")]
    pub poll_interval_sec: u64,

    /// Users processed concurrently within one cycle
    #[arg(long, env = "USER_CONCURRENCY", default_value = "8")]
    pub user_concurrency: usize,

    /// Retry ceiling for transient ledger errors
    #[arg(long, env = "MAX_RETRIES", default_value = "3")]
    pub max_retries: u32,

    /// Maximum delegation hops explored per signing path
    #[arg(long, env = "DELEGATION_DEPTH", default_value = "10")]
    pub delegation_depth: u32,

    /// Page size for pending and directory queries
    #[arg(long, env = "PENDING_PAGE_SIZE", default_value = "100")]
    pub pending_page_size: u64,

    /// Per-request deadline in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "30000")]
    pub request_timeout_ms: u64,

    /// Compute everything but skip store writes
    #[arg(long, env = "DRY_RUN", default_value = "false")]
    pub dry_run: bool,

    /// Log level (debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Logical ledger network.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
    Devnet,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Devnet => "devnet",
        }
    }
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            return Err(format!("ACCUMULATE_API_URL must be an HTTP(S) URL: {}", self.api_url));
        }
        if self.poll_interval_sec == 0 {
            return Err("POLL_INTERVAL_SEC must be positive".to_string());
        }
        if self.user_concurrency == 0 {
            return Err("USER_CONCURRENCY must be positive".to_string());
        }
        if self.pending_page_size == 0 {
            return Err("PENDING_PAGE_SIZE must be positive".to_string());
        }
        if self.users_collection.trim().is_empty() {
            return Err("USERS_COLLECTION must not be empty".to_string());
        }
        match self.log_level.as_str() {
            "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(format!("LOG_LEVEL must be one of debug/info/warn/error, got '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> Args {
        Args::parse_from(["watchtower"])
    }

    #[test]
    fn test_defaults_are_valid() {
        let args = args();
        assert!(args.validate().is_ok());
        assert_eq!(args.poll_interval_sec, 600);
        assert_eq!(args.user_concurrency, 8);
        assert_eq!(args.delegation_depth, 10);
        assert_eq!(args.pending_page_size, 100);
        assert_eq!(args.network, Network::Mainnet);
        assert!(!args.dry_run);
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut bad = args();
        bad.poll_interval_sec = 0;
        assert!(bad.validate().is_err());

        let mut bad = args();
        bad.user_concurrency = 0;
        assert!(bad.validate().is_err());

        let mut bad = args();
        bad.api_url = "not-a-url".into();
        assert!(bad.validate().is_err());

        let mut bad = args();
        bad.log_level = "verbose".into();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_network_parsing() {
        let args = Args::parse_from(["watchtower", "--network", "testnet"]);
        assert_eq!(args.network, Network::Testnet);
        assert_eq!(args.network.as_str(), "testnet");
    }
}
