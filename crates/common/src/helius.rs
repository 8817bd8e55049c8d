use crate::types::{HeliusBalances, HeliusTransaction};
use anyhow::{bail, Context, Result};
use reqwest::Url;
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};

pub struct HeliusClient {
    api_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl HeliusClient {
    pub fn new(api_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http,
        })
    }

    fn address_url(&self, address: &str, resource: &str) -> Result<Url> {
        let mut url = Url::parse(&format!(
            "{}/v0/addresses/{address}/{resource}",
            self.api_url
        ))?;
        url.query_pairs_mut().append_pair("api-key", &self.api_key);
        Ok(url)
    }

    pub fn transactions_url(&self, address: &str) -> Result<Url> {
        self.address_url(address, "transactions")
    }

    pub fn balances_url(&self, address: &str) -> Result<Url> {
        self.address_url(address, "balances")
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &'static str, url: Url) -> Result<T> {
        let start = Instant::now();
        let res = self
            .http
            .get(url)
            .header("accept", "application/json")
            .send()
            .await;
        let ms = start.elapsed().as_secs_f64() * 1000.0;
        metrics::histogram!("ranker_api_latency_ms", "endpoint" => endpoint).record(ms);

        let resp = match res {
            Ok(resp) => resp,
            Err(e) => {
                metrics::counter!("ranker_api_requests_total", "endpoint" => endpoint, "status" => "err")
                    .increment(1);
                return Err(e.into());
            }
        };

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            metrics::counter!("ranker_api_requests_total", "endpoint" => endpoint, "status" => "err")
                .increment(1);
            bail!("{endpoint}: HTTP {status} - {body}");
        }
        metrics::counter!("ranker_api_requests_total", "endpoint" => endpoint, "status" => "ok")
            .increment(1);
        serde_json::from_str(&body).with_context(|| format!("{endpoint}: decoding response"))
    }

    pub async fn fetch_transactions(&self, address: &str) -> Result<Vec<HeliusTransaction>> {
        let url = self.transactions_url(address)?;
        self.get_json("transactions", url).await
    }

    pub async fn fetch_balances(&self, address: &str) -> Result<HeliusBalances> {
        let url = self.balances_url(address)?;
        self.get_json("balances", url).await
    }
}
