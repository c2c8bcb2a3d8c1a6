use serde::Deserialize;

use crate::config::OracleConfig;

/// Current network feerate tiers in sat/vB.
#[derive(Debug, Clone, Copy)]
pub struct FeeTiers {
    pub fastest: f64,
    pub half_hour: f64,
    pub hour: f64,
    pub economy: f64,
    pub minimum: f64,
}

impl FeeTiers {
    /// Select the rate for a configured tier name. Tier names are validated
    /// at config load, so an unknown name here is a programming error.
    pub fn rate(&self, tier: &str) -> anyhow::Result<f64> {
        match tier {
            "fastest" => Ok(self.fastest),
            "half_hour" => Ok(self.half_hour),
            "hour" => Ok(self.hour),
            "economy" => Ok(self.economy),
            "minimum" => Ok(self.minimum),
            other => anyhow::bail!("unknown fee tier '{}'", other),
        }
    }
}

#[async_trait::async_trait]
pub trait FeeOracle: Send + Sync {
    async fn get_fee(&self) -> anyhow::Result<FeeTiers>;
}

/// Mempool.space recommended fees response.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MempoolFees {
    fastest_fee: f64,
    half_hour_fee: f64,
    hour_fee: f64,
    economy_fee: f64,
    minimum_fee: f64,
}

/// Fee oracle backed by the mempool.space recommended-fees endpoint.
pub struct MempoolOracle {
    http: reqwest::Client,
    api_url: String,
}

impl MempoolOracle {
    pub fn new(config: &OracleConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            api_url: config.mempool_api_url.clone(),
        })
    }
}

#[async_trait::async_trait]
impl FeeOracle for MempoolOracle {
    async fn get_fee(&self) -> anyhow::Result<FeeTiers> {
        let url = format!("{}/v1/fees/recommended", self.api_url);
        let resp: MempoolFees = self.http.get(&url).send().await?.json().await?;
        Ok(FeeTiers {
            fastest: resp.fastest_fee,
            half_hour: resp.half_hour_fee,
            hour: resp.hour_fee,
            economy: resp.economy_fee,
            minimum: resp.minimum_fee,
        })
    }
}
