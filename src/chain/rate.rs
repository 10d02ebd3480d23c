use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

/// Rate used when a live lookup fails and none is configured
pub const DEFAULT_FALLBACK_RATE: f64 = 80_000.0;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct PriceResponse {
    ethereum: EthereumPrice,
}

#[derive(Debug, Deserialize)]
struct EthereumPrice {
    inr: f64,
}

/// Source of the rupees-per-ether rate
#[derive(Debug, Clone)]
pub enum RateProvider {
    /// Always the same rate
    Fixed(f64),
    /// Price API lookup on every call, with a fallback
    Live {
        /// HTTP client
        client: reqwest::Client,
        /// Price endpoint returning `{"ethereum":{"inr":...}}`
        url: String,
        /// Rate used when the lookup fails
        fallback: f64,
    },
}

impl RateProvider {
    /// Creates a live provider
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built
    pub fn live(url: impl Into<String>, fallback: f64) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::Live {
            client,
            url: url.into(),
            fallback,
        })
    }

    /// Current rate; never fails, falling back on any lookup error
    pub async fn current(&self) -> f64 {
        match self {
            Self::Fixed(rate) => *rate,
            Self::Live {
                client,
                url,
                fallback,
            } => match fetch_rate(client, url).await {
                Ok(rate) => {
                    info!(rate = %rate, "exchange rate fetched");
                    rate
                }
                Err(e) => {
                    warn!(error = %e, fallback = %fallback, "exchange rate lookup failed, using fallback");
                    *fallback
                }
            },
        }
    }
}

async fn fetch_rate(client: &reqwest::Client, url: &str) -> anyhow::Result<f64> {
    let body = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    parse_rate(&body)
}

/// Extracts the INR price from a price API response
///
/// # Errors
/// Returns error if the body has the wrong shape or the rate is not positive
pub fn parse_rate(body: &str) -> anyhow::Result<f64> {
    let response: PriceResponse = serde_json::from_str(body)?;
    let rate = response.ethereum.inr;
    if !rate.is_finite() || rate <= 0.0 {
        anyhow::bail!("rate out of range: {rate}");
    }
    Ok(rate)
}
