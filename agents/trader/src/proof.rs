use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::Bytes;
use eyre::{eyre, Result, WrapErr};
use serde::Deserialize;
use tracing::debug;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of the short-lived price proofs a trade must carry.
#[async_trait]
pub trait FetchesProof: Send + Sync + Debug {
    /// Fetch a fresh proof for the pair at `pair_index`. Proofs expire
    /// quickly, so callers fetch one per trade attempt.
    async fn fetch_proof(&self, pair_index: u64) -> Result<Bytes>;
}

/// Response of `GET /proof?pairs=<index>`
#[derive(Debug, Deserialize)]
struct ProofResponse {
    #[serde(default)]
    proof: Option<Bytes>,
}

/// Fetches proofs from the off-chain proof service over http
#[derive(Debug, Clone)]
pub struct ProofClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl ProofClient {
    pub fn new(base_url: &Url) -> Result<Self> {
        let endpoint = base_url.join("proof").wrap_err("Invalid proof api url")?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .wrap_err("Failed to build proof http client")?;
        Ok(Self { http, endpoint })
    }
}

#[async_trait]
impl FetchesProof for ProofClient {
    async fn fetch_proof(&self, pair_index: u64) -> Result<Bytes> {
        debug!(pair_index, endpoint = %self.endpoint, "Fetching proof");
        let response = self
            .http
            .get(self.endpoint.clone())
            .query(&[("pairs", pair_index)])
            .header("Accept", "*/*")
            .send()
            .await
            .wrap_err("Proof request failed")?
            .error_for_status()
            .wrap_err("Proof service returned an error status")?;

        let body: ProofResponse = response
            .json()
            .await
            .wrap_err("Failed to parse proof response")?;

        match body.proof {
            Some(proof) if !proof.is_empty() => Ok(proof),
            _ => Err(eyre!("Proof service returned no proof for pair {pair_index}")),
        }
    }
}
