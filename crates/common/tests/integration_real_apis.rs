use std::time::Duration;

use common::helius::HeliusClient;
use common::normalize::{normalize_balances, normalize_transactions};

// Well-known, long-lived mainnet account.
const WALLET: &str = "vines1vzrYbzLMRdu58ou5XTby4qAqVRLmqo36NKPTg";

fn client() -> HeliusClient {
    let key = std::env::var("HELIUS_API_KEY").unwrap();
    HeliusClient::new("https://api.helius.xyz", &key, Duration::from_secs(30)).unwrap()
}

#[tokio::test]
#[ignore] // requires network and HELIUS_API_KEY
async fn test_fetch_real_transactions_normalize() {
    let txs = client().fetch_transactions(WALLET).await.unwrap();
    let rows = normalize_transactions(&txs, WALLET);
    assert!(rows.len() >= txs.len());
    assert!(rows.iter().all(|r| r.wallet_address == WALLET));
}

#[tokio::test]
#[ignore] // requires network and HELIUS_API_KEY
async fn test_fetch_real_balances_normalize() {
    let balances = client().fetch_balances(WALLET).await.unwrap();
    let rows = normalize_balances(&balances, WALLET);
    assert_eq!(rows.len(), balances.tokens.len() + balances.nfts.len());
}
