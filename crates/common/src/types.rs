use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingKind {
    Weighted,
    Model,
}

impl RankingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Weighted => "weighted",
            Self::Model => "model",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "weighted" => Some(Self::Weighted),
            "model" => Some(Self::Model),
            _ => None,
        }
    }
}

/// One transfer leg of one on-chain transaction.
///
/// A transaction without token transfers yields exactly one record; a
/// transaction with N token transfers yields N records sharing `tx_hash`
/// and `fee`. Counting records therefore counts legs, not transactions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionRecord {
    pub wallet_address: String,
    pub tx_hash: String,
    pub timestamp: DateTime<Utc>,
    /// Native-currency amount, or the leg's token amount when no native
    /// value moved. Negative means outflow.
    pub amount: f64,
    pub from_user: Option<String>,
    pub to_user: Option<String>,
    pub token_amount: Option<f64>,
    pub mint: Option<String>,
    /// Native-currency fee, always carried at 9 decimal places.
    pub fee: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetType {
    Token,
    #[serde(rename = "NFT")]
    Nft,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Token => "Token",
            Self::Nft => "NFT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Token" => Some(Self::Token),
            "NFT" => Some(Self::Nft),
            _ => None,
        }
    }
}

/// One held asset of one wallet, snapshotted at fetch time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceRecord {
    pub wallet_address: String,
    pub asset_type: AssetType,
    pub token_account: Option<String>,
    pub mint: Option<String>,
    /// 1 for NFTs; raw balance / 10^decimals for tokens.
    pub amount: f64,
    pub decimals: u32,
    pub symbol: Option<String>,
    pub nft_name: Option<String>,
    pub nft_image: Option<String>,
}

/// Enhanced transaction from Helius `/v0/addresses/{address}/transactions`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HeliusTransaction {
    pub signature: Option<String>,
    /// Unix seconds.
    pub timestamp: Option<i64>,
    /// Lamports.
    pub fee: Option<i64>,
    /// Native amount moved, in lamports.
    pub lamports: Option<i64>,
    #[serde(rename = "tokenTransfers")]
    pub token_transfers: Option<Vec<HeliusTokenTransfer>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HeliusTokenTransfer {
    #[serde(rename = "fromUserAccount")]
    pub from_user_account: Option<String>,
    #[serde(rename = "toUserAccount")]
    pub to_user_account: Option<String>,
    #[serde(rename = "tokenAmount")]
    pub token_amount: Option<f64>,
    pub mint: Option<String>,
}

/// Balances from Helius `/v0/addresses/{address}/balances`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HeliusBalances {
    #[serde(default)]
    pub tokens: Vec<HeliusToken>,
    #[serde(default)]
    pub nfts: Vec<HeliusNft>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HeliusToken {
    #[serde(rename = "tokenAccount")]
    pub token_account: Option<String>,
    pub mint: Option<String>,
    /// Raw amount in base units.
    pub amount: Option<f64>,
    pub decimals: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HeliusNft {
    #[serde(rename = "tokenAccount")]
    pub token_account: Option<String>,
    pub mint: Option<String>,
    pub symbol: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "imageUrl")]
    pub image_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranking_kind_labels() {
        assert_eq!(RankingKind::Weighted.as_str(), "weighted");
        assert_eq!(RankingKind::parse("model"), Some(RankingKind::Model));
        assert_eq!(RankingKind::parse("other"), None);
    }

    #[test]
    fn test_asset_type_round_trips_labels() {
        assert_eq!(AssetType::Token.as_str(), "Token");
        assert_eq!(AssetType::Nft.as_str(), "NFT");
        assert_eq!(AssetType::parse("NFT"), Some(AssetType::Nft));
        assert_eq!(AssetType::parse("nft"), None);
    }

    #[test]
    fn test_parse_transactions_response() {
        let json = r#"[
            {"signature":"5abc","timestamp":1700000000,"fee":5000,"lamports":2000000000,"tokenTransfers":[]},
            {"signature":"6def","timestamp":1700000100,"fee":5000,"tokenTransfers":[
                {"fromUserAccount":"A","toUserAccount":"B","tokenAmount":12.5,"mint":"M1"}
            ]},
            {"signature":"7ghi","timestamp":1700000200,"fee":5000,"tokenTransfers":null}
        ]"#;
        let txs: Vec<HeliusTransaction> = serde_json::from_str(json).unwrap();
        assert_eq!(txs.len(), 3);
        assert_eq!(txs[0].lamports, Some(2_000_000_000));
        assert!(txs[1].lamports.is_none());
        assert_eq!(
            txs[1].token_transfers.as_ref().unwrap()[0].mint.as_deref(),
            Some("M1")
        );
        assert!(txs[2].token_transfers.is_none());
    }

    #[test]
    fn test_parse_balances_without_nfts() {
        let json = r#"{"tokens":[{"tokenAccount":"TA","mint":"M","amount":1500000,"decimals":6}]}"#;
        let balances: HeliusBalances = serde_json::from_str(json).unwrap();
        assert_eq!(balances.tokens.len(), 1);
        assert!(balances.nfts.is_empty());
        assert_eq!(balances.tokens[0].decimals, Some(6));
    }
}
