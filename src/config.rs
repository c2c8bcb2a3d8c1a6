use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub node: NodeConfig,
    pub swap: SwapConfig,
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    pub sink: RoleConfig,
    pub source: RoleConfig,
    #[serde(default)]
    pub loop_out: LoopOutConfig,
}

#[derive(Debug, Deserialize)]
pub struct NodeConfig {
    /// Node management REST endpoint
    pub base_url: String,
    /// API key sent as bearer token
    pub api_key: String,
}

#[derive(Debug, Deserialize)]
pub struct SwapConfig {
    /// Custodial exchange REST endpoint
    pub base_url: String,
    /// Exchange API key
    pub api_key: String,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// On-chain balance floor (satoshis) never touched by any action
    #[serde(default = "default_min_onchain")]
    pub min_onchain_sats: u64,
    /// Dry-run mode: log decisions but execute nothing
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Deserialize)]
pub struct OracleConfig {
    /// Mempool.space API URL
    #[serde(default = "default_mempool_url")]
    pub mempool_api_url: String,
    /// Fee tier: fastest, half_hour, hour, economy or minimum
    #[serde(default = "default_fee_tier")]
    pub tier: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct NotifyConfig {
    /// Telegram bot token (empty = log-only notifications)
    #[serde(default)]
    pub telegram_bot_token: String,
    /// Telegram chat id
    #[serde(default)]
    pub telegram_chat_id: String,
}

/// Per-role (sink or source) channel group configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RoleConfig {
    /// Counterparty node id channels of this role are opened to
    pub peer_node_id: String,
    /// Total satoshis this role's channel group may hold
    #[serde(default = "default_budget")]
    pub budget_sats: u64,
    /// Number of channels to keep open toward the peer
    #[serde(default = "default_target_count")]
    pub target_channel_count: usize,
    /// Fraction of capacity below which a channel is "empty"
    #[serde(default = "default_close_ratio")]
    pub close_ratio: f64,
    /// Forwarding base fee for new channels (millisatoshis)
    #[serde(default = "default_base_fee_msat")]
    pub base_fee_msat: u64,
    /// Forwarding proportional fee for new channels (PPM)
    #[serde(default = "default_fee_ppm")]
    pub fee_ppm: u64,
    /// CLTV delta for new channels
    #[serde(default = "default_cltv_delta")]
    pub cltv_delta: u16,
    /// Minimum HTLC size for new channels (satoshis)
    #[serde(default = "default_min_htlc")]
    pub min_htlc_sats: u64,
    /// Ceiling on on-chain actions for this role (sat/vB)
    #[serde(default = "default_max_sat_per_vbyte")]
    pub max_sat_per_vbyte: f64,
}

/// Loop-out (drain/harvest) tuning. Applies to the source role.
#[derive(Debug, Clone, Deserialize)]
pub struct LoopOutConfig {
    /// Invoice amount for the first attempt (satoshis)
    #[serde(default = "default_loop_out_amount")]
    pub amount_sats: u64,
    /// Amount multiplier applied per attempt
    #[serde(default = "default_loop_out_backoff")]
    pub backoff: f64,
    /// Attempt budget before giving up
    #[serde(default = "default_loop_out_attempts")]
    pub attempts: u32,
    /// Routing fee ceiling for loop-out payments (PPM)
    #[serde(default = "default_loop_out_fee_ppm")]
    pub max_routing_fee_ppm: u64,
    /// Account balance above which excess is swept on-chain (satoshis)
    #[serde(default = "default_max_account_balance")]
    pub max_account_balance_sats: u64,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}
fn default_min_onchain() -> u64 {
    100_000
}
fn default_mempool_url() -> String {
    "https://mempool.space/api".to_string()
}
fn default_fee_tier() -> String {
    "hour".to_string()
}
fn default_budget() -> u64 {
    10_000_000
}
fn default_target_count() -> usize {
    2
}
fn default_close_ratio() -> f64 {
    0.1
}
fn default_base_fee_msat() -> u64 {
    1000
}
fn default_fee_ppm() -> u64 {
    100
}
fn default_cltv_delta() -> u16 {
    144
}
fn default_min_htlc() -> u64 {
    1
}
fn default_max_sat_per_vbyte() -> f64 {
    30.0
}
fn default_loop_out_amount() -> u64 {
    500_000
}
fn default_loop_out_backoff() -> f64 {
    0.5
}
fn default_loop_out_attempts() -> u32 {
    3
}
fn default_loop_out_fee_ppm() -> u64 {
    1000
}
fn default_max_account_balance() -> u64 {
    5_000_000
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            min_onchain_sats: default_min_onchain(),
            dry_run: false,
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            mempool_api_url: default_mempool_url(),
            tier: default_fee_tier(),
        }
    }
}

impl Default for LoopOutConfig {
    fn default() -> Self {
        Self {
            amount_sats: default_loop_out_amount(),
            backoff: default_loop_out_backoff(),
            attempts: default_loop_out_attempts(),
            max_routing_fee_ppm: default_loop_out_fee_ppm(),
            max_account_balance_sats: default_max_account_balance(),
        }
    }
}

const FEE_TIERS: &[&str] = &["fastest", "half_hour", "hour", "economy", "minimum"];

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for (role, cfg) in [("sink", &self.sink), ("source", &self.source)] {
            if cfg.target_channel_count == 0 {
                anyhow::bail!("{}: target_channel_count must be at least 1", role);
            }
            if !(0.0..=1.0).contains(&cfg.close_ratio) {
                anyhow::bail!(
                    "{}: close_ratio ({}) must be between 0.0 and 1.0",
                    role,
                    cfg.close_ratio
                );
            }
            if cfg.budget_sats == 0 {
                anyhow::bail!("{}: budget_sats must be greater than 0", role);
            }
            if cfg.max_sat_per_vbyte <= 0.0 {
                anyhow::bail!("{}: max_sat_per_vbyte must be positive", role);
            }
            if cfg.peer_node_id.is_empty() {
                anyhow::bail!("{}: peer_node_id must be set", role);
            }
        }
        if self.loop_out.attempts == 0 {
            anyhow::bail!("loop_out: attempts must be at least 1");
        }
        if self.loop_out.backoff <= 0.0 {
            anyhow::bail!("loop_out: backoff must be positive");
        }
        if self.loop_out.amount_sats == 0 {
            anyhow::bail!("loop_out: amount_sats must be greater than 0");
        }
        if !FEE_TIERS.contains(&self.oracle.tier.as_str()) {
            anyhow::bail!(
                "oracle: unknown fee tier '{}' (expected one of {:?})",
                self.oracle.tier,
                FEE_TIERS
            );
        }
        Ok(())
    }

    /// Create a config with all defaults for testing purposes.
    #[cfg(test)]
    pub fn test_default() -> Self {
        Self {
            node: NodeConfig {
                base_url: "localhost:3002".to_string(),
                api_key: "deadbeef".to_string(),
            },
            swap: SwapConfig {
                base_url: "localhost:9000".to_string(),
                api_key: "cafebabe".to_string(),
            },
            general: GeneralConfig::default(),
            oracle: OracleConfig::default(),
            notify: NotifyConfig::default(),
            sink: RoleConfig::test_default("sink_peer"),
            source: RoleConfig::test_default("source_peer"),
            loop_out: LoopOutConfig::default(),
        }
    }
}

impl RoleConfig {
    #[cfg(test)]
    pub fn test_default(peer: &str) -> Self {
        Self {
            peer_node_id: peer.to_string(),
            budget_sats: default_budget(),
            target_channel_count: default_target_count(),
            close_ratio: default_close_ratio(),
            base_fee_msat: default_base_fee_msat(),
            fee_ppm: default_fee_ppm(),
            cltv_delta: default_cltv_delta(),
            min_htlc_sats: default_min_htlc(),
            max_sat_per_vbyte: default_max_sat_per_vbyte(),
        }
    }
}
