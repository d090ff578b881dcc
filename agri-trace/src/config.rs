//! Trace Engine Configuration
//!
//! Configuration for the ledger RPC connection, the price-scoring process
//! and the mapping index. Supports loading from environment variables with
//! the AGRI_ prefix.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::error::{TraceError, TraceResult};

/// Which record wins when several share the same descriptive fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Lowest id found during the ascending scan
    #[default]
    FirstCreated,
    /// Highest id found during the ascending scan
    MostRecent,
}

impl MatchPolicy {
    /// Parse from string (for environment variables)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "first" | "first_created" | "oldest" => Some(Self::FirstCreated),
            "latest" | "most_recent" | "last" => Some(Self::MostRecent),
            _ => None,
        }
    }
}

/// Ledger RPC configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerRpcConfig {
    /// RPC endpoint URL
    pub url: String,
    /// Address of the product contract
    pub contract_address: String,
    /// Account the client transacts as
    pub account: String,
    /// Basic-auth username (optional)
    pub username: Option<String>,
    /// Basic-auth password (optional)
    pub password: Option<String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    30
}

impl Default for LedgerRpcConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8545".to_string(),
            contract_address: String::new(),
            account: String::new(),
            username: None,
            password: None,
            timeout_secs: 30,
        }
    }
}

impl LedgerRpcConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - AGRI_LEDGER_RPC_URL: RPC endpoint URL
    /// - AGRI_LEDGER_CONTRACT: Product contract address
    /// - AGRI_LEDGER_ACCOUNT: Account to transact as
    /// - AGRI_LEDGER_RPC_USER: Basic-auth username (optional)
    /// - AGRI_LEDGER_RPC_PASS: Basic-auth password (optional)
    /// - AGRI_LEDGER_RPC_TIMEOUT: Request timeout in seconds
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: env::var("AGRI_LEDGER_RPC_URL").unwrap_or(defaults.url),
            contract_address: env::var("AGRI_LEDGER_CONTRACT").unwrap_or_default(),
            account: env::var("AGRI_LEDGER_ACCOUNT").unwrap_or_default(),
            username: env::var("AGRI_LEDGER_RPC_USER").ok(),
            password: env::var("AGRI_LEDGER_RPC_PASS").ok(),
            timeout_secs: env::var("AGRI_LEDGER_RPC_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        }
    }

    /// Local development node
    pub fn development(contract_address: &str, account: &str) -> Self {
        Self {
            url: "http://127.0.0.1:8545".to_string(),
            contract_address: contract_address.to_string(),
            account: account.to_string(),
            username: None,
            password: None,
            timeout_secs: 10,
        }
    }

    /// Set basic-auth credentials
    pub fn with_auth(mut self, username: &str, password: &str) -> Self {
        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        self
    }
}

/// Price scoring process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Interpreter names tried in order
    pub candidates: Vec<String>,
    /// Script passed as the first argument
    pub script: PathBuf,
    /// Sub-command passed before the JSON payload
    #[serde(default = "default_command")]
    pub command: String,
    /// Wall-clock cap per invocation, in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_command() -> String {
    "check".to_string()
}

fn default_candidates() -> Vec<String> {
    vec!["python".to_string(), "python3".to_string(), "py".to_string()]
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            candidates: default_candidates(),
            script: PathBuf::from("ml/price_model.py"),
            command: default_command(),
            timeout_secs: 30,
        }
    }
}

impl ScoringConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - AGRI_SCORING_CANDIDATES: Comma separated interpreter names
    /// - AGRI_SCORING_SCRIPT: Path to the scoring script
    /// - AGRI_SCORING_TIMEOUT: Per-invocation timeout in seconds
    pub fn from_env() -> Self {
        let candidates = env::var("AGRI_SCORING_CANDIDATES")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|c| !c.is_empty())
            .unwrap_or_else(default_candidates);

        Self {
            candidates,
            script: env::var("AGRI_SCORING_SCRIPT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("ml/price_model.py")),
            command: default_command(),
            timeout_secs: env::var("AGRI_SCORING_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        }
    }

    /// Configuration for a specific interpreter list and script
    pub fn with_candidates<I, S>(candidates: I, script: impl Into<PathBuf>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            candidates: candidates.into_iter().map(Into::into).collect(),
            script: script.into(),
            command: default_command(),
            timeout_secs: 30,
        }
    }

    /// Set the per-invocation timeout
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// Mapping index storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Data directory (empty = in-memory)
    pub data_dir: String,
    /// Flush to disk after every write
    #[serde(default)]
    pub flush_on_write: bool,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            data_dir: "./mapping_data".to_string(),
            flush_on_write: true,
        }
    }
}

impl MappingConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - AGRI_MAPPING_DIR: Data directory (empty = in-memory)
    pub fn from_env() -> Self {
        Self {
            data_dir: env::var("AGRI_MAPPING_DIR").unwrap_or_else(|_| "./mapping_data".to_string()),
            flush_on_write: true,
        }
    }

    /// Create a test configuration (in-memory storage)
    pub fn test() -> Self {
        Self {
            data_dir: String::new(),
            flush_on_write: false,
        }
    }

    /// Whether this configuration selects the in-memory store
    pub fn is_in_memory(&self) -> bool {
        self.data_dir.trim().is_empty()
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceConfig {
    pub ledger: LedgerRpcConfig,
    pub scoring: ScoringConfig,
    pub mapping: MappingConfig,
    /// Base URL embedded in scannable codes
    #[serde(default = "default_code_url_base")]
    pub code_url_base: String,
    /// Tie-break for field-based matching
    #[serde(default)]
    pub match_policy: MatchPolicy,
}

pub(crate) fn default_code_url_base() -> String {
    "http://localhost:5173".to_string()
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            ledger: LedgerRpcConfig::default(),
            scoring: ScoringConfig::default(),
            mapping: MappingConfig::default(),
            code_url_base: default_code_url_base(),
            match_policy: MatchPolicy::FirstCreated,
        }
    }
}

impl TraceConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - AGRI_CODE_URL_BASE: Base URL for scannable codes
    /// - AGRI_MATCH_POLICY: first / latest
    ///
    /// Also reads ledger, scoring and mapping config from their env vars.
    pub fn from_env() -> Self {
        Self {
            ledger: LedgerRpcConfig::from_env(),
            scoring: ScoringConfig::from_env(),
            mapping: MappingConfig::from_env(),
            code_url_base: env::var("AGRI_CODE_URL_BASE").unwrap_or_else(|_| default_code_url_base()),
            match_policy: env::var("AGRI_MATCH_POLICY")
                .ok()
                .and_then(|s| MatchPolicy::from_str(&s))
                .unwrap_or_default(),
        }
    }

    /// Create a test configuration
    pub fn test() -> Self {
        Self {
            mapping: MappingConfig::test(),
            ..Self::default()
        }
    }

    /// Check for values that would make the engine unusable
    pub fn validate(&self) -> TraceResult<()> {
        if self.ledger.url.trim().is_empty() {
            return Err(TraceError::Configuration("ledger url is empty".to_string()));
        }
        if self.ledger.timeout_secs == 0 {
            return Err(TraceError::Configuration("ledger timeout must be > 0".to_string()));
        }
        if self.scoring.candidates.is_empty() {
            return Err(TraceError::Configuration(
                "at least one scoring candidate is required".to_string(),
            ));
        }
        if self.scoring.timeout_secs == 0 {
            return Err(TraceError::Configuration("scoring timeout must be > 0".to_string()));
        }
        if self.code_url_base.trim().is_empty() {
            return Err(TraceError::Configuration("code url base is empty".to_string()));
        }
        Ok(())
    }
}
