use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

use crate::config::NodeConfig;

/// A channel as reported by the node's management API.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeChannel {
    pub channel_id: String,
    pub counterparty_node_id: String,
    pub capacity_sats: u64,
    pub local_balance_sats: u64,
    pub local_reserve_sats: u64,
}

/// Parameters for a new channel open.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelTemplate {
    pub peer_node_id: String,
    pub capacity_sats: u64,
    pub base_fee_msat: u64,
    pub fee_ppm: u64,
    pub cltv_delta: u16,
    pub min_htlc_sats: u64,
}

/// Both halves of the on-chain wallet balance, read in a single call so they
/// describe the same instant; separate fetches could straddle a block.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WalletBalance {
    pub confirmed_sats: u64,
    /// Signed: negative means funds are currently leaving the wallet.
    pub unconfirmed_sats: i64,
}

/// Payment failure classes surfaced by `pay_invoice`.
///
/// The drain engine retries both classes within its attempt budget but logs
/// them differently; "no route" is the common transient case.
#[derive(Debug)]
pub enum PayError {
    NoRoute,
    Other(anyhow::Error),
}

impl std::fmt::Display for PayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayError::NoRoute => write!(f, "no route to destination"),
            PayError::Other(e) => write!(f, "payment failed: {e:#}"),
        }
    }
}

impl std::error::Error for PayError {}

/// Trait abstracting the node API surface used by lnwarden: channel
/// lifecycle plus the on-chain wallet.
///
/// This enables mock-based testing without a live node.
#[async_trait::async_trait]
pub trait NodeClient: Send + Sync {
    async fn get_opened_channels(&self) -> anyhow::Result<Vec<NodeChannel>>;
    /// Open a channel, returning the funding txid.
    async fn open_channel(&self, template: &ChannelTemplate) -> anyhow::Result<String>;
    /// Cooperatively close a channel, returning the closing txid.
    async fn close_channel(
        &self,
        channel_id: &str,
        feerate_sat_per_vb: f64,
    ) -> anyhow::Result<String>;
    /// Pay a bolt11 invoice, returning the preimage.
    async fn pay_invoice(&self, bolt11: &str, max_fee_sats: u64) -> Result<String, PayError>;
    async fn get_wallet_balance(&self) -> anyhow::Result<WalletBalance>;
}

/// Retrying REST client for the node management API.
///
/// Read calls are retried with exponential backoff; mutating calls are
/// single-shot since a blind retry of a spend can double-execute.
pub struct RestNodeClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

const MAX_RETRIES: u32 = 3;
const RETRY_BASE_MS: u64 = 1000;

#[derive(Deserialize)]
struct ChannelsResponse {
    channels: Vec<NodeChannel>,
}

#[derive(Deserialize)]
struct TxResponse {
    txid: String,
}

#[derive(Deserialize)]
struct PayResponse {
    preimage: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

impl RestNodeClient {
    pub fn new(config: &NodeConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("https://{}{}", self.base_url, path)
    }

    async fn get_with_retry<T: serde::de::DeserializeOwned>(
        &self,
        name: &str,
        path: &str,
    ) -> anyhow::Result<T> {
        for attempt in 0..MAX_RETRIES {
            let result = async {
                let resp = self
                    .http
                    .get(self.url(path))
                    .bearer_auth(&self.api_key)
                    .send()
                    .await?
                    .error_for_status()?;
                resp.json::<T>().await.map_err(anyhow::Error::from)
            }
            .await;

            match result {
                Ok(value) => {
                    debug!("{}: success", name);
                    return Ok(value);
                }
                Err(e) => {
                    if attempt < MAX_RETRIES - 1 {
                        let delay = RETRY_BASE_MS * 2u64.pow(attempt);
                        warn!(
                            "{}: attempt {} failed ({:#}), retrying in {}ms",
                            name,
                            attempt + 1,
                            e,
                            delay
                        );
                        sleep(Duration::from_millis(delay)).await;
                    } else {
                        return Err(anyhow::anyhow!(
                            "{}: all {} attempts failed: {:#}",
                            name,
                            MAX_RETRIES,
                            e
                        ));
                    }
                }
            }
        }
        unreachable!()
    }

    async fn post<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        name: &str,
        path: &str,
        body: &B,
    ) -> anyhow::Result<T> {
        let resp = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("{}: HTTP {}: {}", name, status, text);
        }
        debug!("{}: success", name);
        Ok(resp.json().await?)
    }
}

#[async_trait::async_trait]
impl NodeClient for RestNodeClient {
    async fn get_opened_channels(&self) -> anyhow::Result<Vec<NodeChannel>> {
        let resp: ChannelsResponse = self.get_with_retry("ListChannels", "/v1/channels").await?;
        Ok(resp.channels)
    }

    async fn open_channel(&self, template: &ChannelTemplate) -> anyhow::Result<String> {
        let resp: TxResponse = self
            .post("OpenChannel", "/v1/channels/open", template)
            .await?;
        Ok(resp.txid)
    }

    async fn close_channel(
        &self,
        channel_id: &str,
        feerate_sat_per_vb: f64,
    ) -> anyhow::Result<String> {
        let body = serde_json::json!({
            "channel_id": channel_id,
            "feerate_sat_per_vb": feerate_sat_per_vb,
        });
        let resp: TxResponse = self.post("CloseChannel", "/v1/channels/close", &body).await?;
        Ok(resp.txid)
    }

    async fn pay_invoice(&self, bolt11: &str, max_fee_sats: u64) -> Result<String, PayError> {
        let body = serde_json::json!({
            "invoice": bolt11,
            "max_fee_sats": max_fee_sats,
        });
        let resp = self
            .http
            .post(self.url("/v1/payments/bolt11"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PayError::Other(e.into()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            if let Ok(err) = serde_json::from_str::<ErrorBody>(&text) {
                if err.code == "no_route" {
                    return Err(PayError::NoRoute);
                }
                return Err(PayError::Other(anyhow::anyhow!(
                    "PayInvoice: {} ({})",
                    err.message,
                    err.code
                )));
            }
            return Err(PayError::Other(anyhow::anyhow!(
                "PayInvoice: HTTP {}: {}",
                status,
                text
            )));
        }

        let pay: PayResponse = resp.json().await.map_err(|e| PayError::Other(e.into()))?;
        Ok(pay.preimage)
    }

    async fn get_wallet_balance(&self) -> anyhow::Result<WalletBalance> {
        self.get_with_retry("GetBalance", "/v1/wallet/balance").await
    }
}

// ---------------------------------------------------------------------------
// Mock client for testing
// ---------------------------------------------------------------------------

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Scripted result for one `pay_invoice` call.
    #[derive(Debug, Clone)]
    pub enum ScriptedPay {
        Ok,
        NoRoute,
        Fail(String),
    }

    /// Mock node client with preset responses and call recorders.
    pub struct MockNodeClient {
        pub channels: Vec<NodeChannel>,
        pub confirmed_sats: u64,
        pub unconfirmed_sats: i64,
        /// Errors every read call when set, for fail-closed tests.
        pub fail_reads: bool,
        /// Errors every mutating call when set.
        pub fail_mutations: bool,
        /// Consumed front-to-back by `pay_invoice`; empty means success.
        pub pay_script: Mutex<VecDeque<ScriptedPay>>,
        pub open_channel_calls: Arc<Mutex<Vec<ChannelTemplate>>>,
        pub close_channel_calls: Arc<Mutex<Vec<(String, f64)>>>,
        pub pay_invoice_calls: Arc<Mutex<Vec<(String, u64)>>>,
        pub wallet_balance_calls: Arc<Mutex<u32>>,
    }

    impl MockNodeClient {
        pub fn new() -> Self {
            Self {
                channels: Vec::new(),
                confirmed_sats: 0,
                unconfirmed_sats: 0,
                fail_reads: false,
                fail_mutations: false,
                pay_script: Mutex::new(VecDeque::new()),
                open_channel_calls: Arc::new(Mutex::new(Vec::new())),
                close_channel_calls: Arc::new(Mutex::new(Vec::new())),
                pay_invoice_calls: Arc::new(Mutex::new(Vec::new())),
                wallet_balance_calls: Arc::new(Mutex::new(0)),
            }
        }

        pub fn script_payments(&self, script: &[ScriptedPay]) {
            let mut q = self.pay_script.lock().unwrap();
            q.clear();
            q.extend(script.iter().cloned());
        }
    }

    pub fn make_channel(id: &str, peer: &str, capacity: u64, local: u64) -> NodeChannel {
        NodeChannel {
            channel_id: id.to_string(),
            counterparty_node_id: peer.to_string(),
            capacity_sats: capacity,
            local_balance_sats: local,
            local_reserve_sats: capacity / 100,
        }
    }

    #[async_trait::async_trait]
    impl NodeClient for MockNodeClient {
        async fn get_opened_channels(&self) -> anyhow::Result<Vec<NodeChannel>> {
            if self.fail_reads {
                anyhow::bail!("mock: node unreachable");
            }
            Ok(self.channels.clone())
        }

        async fn open_channel(&self, template: &ChannelTemplate) -> anyhow::Result<String> {
            if self.fail_mutations {
                anyhow::bail!("mock: open rejected");
            }
            self.open_channel_calls.lock().unwrap().push(template.clone());
            Ok(format!("txid_open_{}", template.peer_node_id))
        }

        async fn close_channel(
            &self,
            channel_id: &str,
            feerate_sat_per_vb: f64,
        ) -> anyhow::Result<String> {
            if self.fail_mutations {
                anyhow::bail!("mock: close rejected");
            }
            self.close_channel_calls
                .lock()
                .unwrap()
                .push((channel_id.to_string(), feerate_sat_per_vb));
            Ok(format!("txid_close_{}", channel_id))
        }

        async fn pay_invoice(&self, bolt11: &str, max_fee_sats: u64) -> Result<String, PayError> {
            self.pay_invoice_calls
                .lock()
                .unwrap()
                .push((bolt11.to_string(), max_fee_sats));
            match self.pay_script.lock().unwrap().pop_front() {
                None | Some(ScriptedPay::Ok) => Ok("preimage".to_string()),
                Some(ScriptedPay::NoRoute) => Err(PayError::NoRoute),
                Some(ScriptedPay::Fail(msg)) => Err(PayError::Other(anyhow::anyhow!(msg))),
            }
        }

        async fn get_wallet_balance(&self) -> anyhow::Result<WalletBalance> {
            *self.wallet_balance_calls.lock().unwrap() += 1;
            if self.fail_reads {
                anyhow::bail!("mock: node unreachable");
            }
            Ok(WalletBalance {
                confirmed_sats: self.confirmed_sats,
                unconfirmed_sats: self.unconfirmed_sats,
            })
        }
    }
}
