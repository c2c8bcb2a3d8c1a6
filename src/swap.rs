use log::debug;
use serde::Deserialize;
use std::time::Duration;

use crate::config::SwapConfig;

/// Trait abstracting the custodial exchange API surface used by lnwarden.
///
/// The account is a reserve of on-chain and lightning liquidity: it can
/// report its balance, issue invoices that pull channel liquidity in, and
/// send funds back to the node's wallet on-chain.
#[async_trait::async_trait]
pub trait SwapService: Send + Sync {
    async fn get_balance(&self) -> anyhow::Result<u64>;
    /// Request a bolt11 invoice payable into the account.
    async fn get_invoice(&self, amount_sats: u64) -> anyhow::Result<String>;
    /// Withdraw on-chain toward the node's wallet address on file.
    async fn send_onchain(&self, amount_sats: u64, feerate_sat_per_vb: f64) -> anyhow::Result<()>;
    /// Quoted withdrawal fee for an on-chain send of this size.
    async fn get_onchain_fee(&self, amount_sats: u64) -> anyhow::Result<u64>;
}

/// REST client for a custodial exchange account.
pub struct RestSwapClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct BalanceResponse {
    balance_sats: u64,
}

#[derive(Deserialize)]
struct InvoiceResponse {
    bolt11: String,
}

#[derive(Deserialize)]
struct FeeQuoteResponse {
    fee_sats: u64,
}

impl RestSwapClient {
    pub fn new(config: &SwapConfig) -> anyhow::Result<Self> {
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
}

#[async_trait::async_trait]
impl SwapService for RestSwapClient {
    async fn get_balance(&self) -> anyhow::Result<u64> {
        let resp: BalanceResponse = self
            .http
            .get(self.url("/v1/account/balance"))
            .header("X-Api-Key", &self.api_key)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!("Swap: account balance {} sat", resp.balance_sats);
        Ok(resp.balance_sats)
    }

    async fn get_invoice(&self, amount_sats: u64) -> anyhow::Result<String> {
        let body = serde_json::json!({ "amount_sats": amount_sats });
        let resp: InvoiceResponse = self
            .http
            .post(self.url("/v1/lightning/invoice"))
            .header("X-Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp.bolt11)
    }

    async fn send_onchain(&self, amount_sats: u64, feerate_sat_per_vb: f64) -> anyhow::Result<()> {
        let body = serde_json::json!({
            "amount_sats": amount_sats,
            "feerate_sat_per_vb": feerate_sat_per_vb,
        });
        self.http
            .post(self.url("/v1/onchain/withdraw"))
            .header("X-Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        debug!("Swap: withdrawal of {} sat accepted", amount_sats);
        Ok(())
    }

    async fn get_onchain_fee(&self, amount_sats: u64) -> anyhow::Result<u64> {
        let resp: FeeQuoteResponse = self
            .http
            .get(self.url("/v1/onchain/fee"))
            .header("X-Api-Key", &self.api_key)
            .query(&[("amount_sats", amount_sats)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp.fee_sats)
    }
}

// ---------------------------------------------------------------------------
// Mock swap service for testing
// ---------------------------------------------------------------------------
