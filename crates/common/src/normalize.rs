//! Flattens Helius payloads into transaction and balance rows.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::types::{
    AssetType, BalanceRecord, HeliusBalances, HeliusTransaction, TransactionRecord,
};

const LAMPORTS_PER_SOL: f64 = 1e9;
const FEE_SCALE: u32 = 9;

fn round9(x: f64) -> f64 {
    (x * 1e9).round() / 1e9
}

fn unix_to_utc(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

/// One row per transaction without token transfers, one row per leg otherwise.
pub fn normalize_transactions(
    transactions: &[HeliusTransaction],
    wallet_address: &str,
) -> Vec<TransactionRecord> {
    let mut rows = Vec::with_capacity(transactions.len());

    for tx in transactions {
        // Lamports are integral; the f64 cast is exact below 2^53.
        #[allow(clippy::cast_precision_loss)]
        let sol_amount = tx.lamports.unwrap_or(0) as f64 / LAMPORTS_PER_SOL;
        let tx_hash = tx.signature.clone().unwrap_or_default();
        let timestamp = unix_to_utc(tx.timestamp.unwrap_or(0));
        let fee = Decimal::new(tx.fee.unwrap_or(0), FEE_SCALE);

        let transfers = tx.token_transfers.as_deref().unwrap_or(&[]);
        if transfers.is_empty() {
            rows.push(TransactionRecord {
                wallet_address: wallet_address.to_string(),
                tx_hash,
                timestamp,
                amount: round9(sol_amount),
                from_user: None,
                to_user: None,
                token_amount: None,
                mint: None,
                fee,
            });
            continue;
        }

        for transfer in transfers {
            let token_amount = transfer.token_amount.unwrap_or(0.0);
            let amount = if sol_amount > 0.0 {
                round9(sol_amount)
            } else {
                round9(token_amount)
            };
            rows.push(TransactionRecord {
                wallet_address: wallet_address.to_string(),
                tx_hash: tx_hash.clone(),
                timestamp,
                amount,
                from_user: transfer.from_user_account.clone(),
                to_user: transfer.to_user_account.clone(),
                token_amount: transfer.token_amount,
                mint: transfer.mint.clone(),
                fee,
            });
        }
    }

    rows
}

/// Fungible tokens first, then NFTs.
pub fn normalize_balances(balances: &HeliusBalances, wallet_address: &str) -> Vec<BalanceRecord> {
    let tokens = balances.tokens.iter().map(|token| {
        let decimals = token.decimals.unwrap_or(0);
        let scale = 10_f64.powi(i32::try_from(decimals).unwrap_or(i32::MAX));
        BalanceRecord {
            wallet_address: wallet_address.to_string(),
            asset_type: AssetType::Token,
            token_account: token.token_account.clone(),
            mint: token.mint.clone(),
            amount: round9(token.amount.unwrap_or(0.0) / scale),
            decimals,
            symbol: None,
            nft_name: None,
            nft_image: None,
        }
    });

    let nfts = balances.nfts.iter().map(|nft| BalanceRecord {
        wallet_address: wallet_address.to_string(),
        asset_type: AssetType::Nft,
        token_account: nft.token_account.clone(),
        mint: nft.mint.clone(),
        amount: 1.0,
        decimals: 0,
        symbol: nft.symbol.clone(),
        nft_name: nft.name.clone(),
        nft_image: nft.image_url.clone(),
    });

    tokens.chain(nfts).collect()
}
