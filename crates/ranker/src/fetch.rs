use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use common::helius::HeliusClient;
use common::normalize::{normalize_balances, normalize_transactions};
use common::types::{BalanceRecord, HeliusBalances, HeliusTransaction, TransactionRecord};

use crate::row_store::RowStore;

/// Per-wallet ledger history and current holdings.
pub trait LedgerSource {
    fn fetch_transactions(
        &self,
        address: &str,
    ) -> impl std::future::Future<Output = Result<Vec<HeliusTransaction>>> + Send;

    fn fetch_balances(
        &self,
        address: &str,
    ) -> impl std::future::Future<Output = Result<HeliusBalances>> + Send;
}

impl LedgerSource for HeliusClient {
    async fn fetch_transactions(&self, address: &str) -> Result<Vec<HeliusTransaction>> {
        HeliusClient::fetch_transactions(self, address).await
    }

    async fn fetch_balances(&self, address: &str) -> Result<HeliusBalances> {
        HeliusClient::fetch_balances(self, address).await
    }
}

/// Wallet addresses from the first column of a header-less CSV.
pub fn read_wallet_list(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let mut wallets = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("reading {}", path.display()))?;
        if let Some(address) = record.get(0).map(str::trim).filter(|a| !a.is_empty()) {
            wallets.push(address.to_string());
        }
    }
    Ok(wallets)
}

/// Fetch and normalize every wallet in order, pausing `delay` between remote calls.
///
/// A failed fetch drops that wallet's table (transactions or balances) and
/// moves on; nothing is retried.
pub async fn fetch_wallets<S: LedgerSource + Sync>(
    source: &S,
    addresses: &[String],
    delay: Duration,
) -> RowStore {
    let mut transactions: Vec<TransactionRecord> = Vec::new();
    let mut balances: Vec<BalanceRecord> = Vec::new();
    let mut first_call = true;

    for address in addresses {
        pace(&mut first_call, delay).await;
        match source.fetch_transactions(address).await {
            Ok(txs) => transactions.extend(normalize_transactions(&txs, address)),
            Err(e) => tracing::warn!(wallet = %address, error = %e, "transactions fetch failed"),
        }

        pace(&mut first_call, delay).await;
        match source.fetch_balances(address).await {
            Ok(payload) => balances.extend(normalize_balances(&payload, address)),
            Err(e) => tracing::warn!(wallet = %address, error = %e, "balances fetch failed"),
        }
    }

    tracing::info!(
        wallets = addresses.len(),
        transactions = transactions.len(),
        balances = balances.len(),
        "fetch done"
    );
    RowStore::new(transactions, balances)
}

async fn pace(first_call: &mut bool, delay: Duration) {
    if *first_call {
        *first_call = false;
    } else if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
