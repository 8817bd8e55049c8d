use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use common::types::{AssetType, BalanceRecord, TransactionRecord};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

pub const TRANSACTIONS: &str = "transactions";
pub const BALANCES: &str = "balances";

/// Canonical column names with the legacy header spellings accepted on load.
const TRANSACTION_COLUMNS: &[(&str, &[&str])] = &[
    ("wallet_address", &[]),
    ("tx_hash", &["txHash"]),
    ("timestamp", &[]),
    ("amount", &[]),
    ("from_user", &["fromUser"]),
    ("to_user", &["toUser"]),
    ("token_amount", &["tokenAmount"]),
    ("mint", &[]),
    ("fee", &[]),
];

const BALANCE_COLUMNS: &[(&str, &[&str])] = &[
    ("wallet_address", &[]),
    ("asset_type", &[]),
    ("token_account", &[]),
    ("mint", &[]),
    ("amount", &[]),
    ("decimals", &[]),
    ("symbol", &[]),
    ("nft_name", &[]),
    ("nft_image", &[]),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("{table}: missing required column `{column}`")]
    MissingColumn {
        table: &'static str,
        column: &'static str,
    },
    #[error("{table}: line {line}: invalid `{column}` value {value:?}")]
    InvalidValue {
        table: &'static str,
        column: &'static str,
        line: u64,
        value: String,
    },
}

/// Rows plus the set of columns the source actually carried.
///
/// Cells of absent columns hold placeholder defaults; consumers must call
/// [`Table::require`] before reading them.
#[derive(Debug, Clone)]
pub struct Table<R> {
    name: &'static str,
    columns: BTreeSet<&'static str>,
    rows: Vec<R>,
}

impl<R> Table<R> {
    fn complete(name: &'static str, layout: &[(&'static str, &[&str])], rows: Vec<R>) -> Self {
        Self {
            name,
            columns: layout.iter().map(|(c, _)| *c).collect(),
            rows,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    pub fn require(&self, required: &[&'static str]) -> std::result::Result<(), SchemaError> {
        match required.iter().copied().find(|c| !self.has_column(c)) {
            Some(column) => Err(SchemaError::MissingColumn {
                table: self.name,
                column,
            }),
            None => Ok(()),
        }
    }

    #[cfg(test)]
    pub fn without_column(mut self, column: &str) -> Self {
        self.columns.remove(column);
        self
    }
}

#[derive(Debug, Clone)]
pub struct RowStore {
    pub transactions: Table<TransactionRecord>,
    pub balances: Table<BalanceRecord>,
}

impl RowStore {
    pub fn new(transactions: Vec<TransactionRecord>, balances: Vec<BalanceRecord>) -> Self {
        Self {
            transactions: Table::complete(TRANSACTIONS, TRANSACTION_COLUMNS, transactions),
            balances: Table::complete(BALANCES, BALANCE_COLUMNS, balances),
        }
    }

    pub fn load(transactions_csv: &Path, balances_csv: &Path) -> Result<Self> {
        let transactions = read_transactions(
            csv::Reader::from_path(transactions_csv)
                .with_context(|| format!("opening {}", transactions_csv.display()))?,
        )
        .with_context(|| format!("loading {}", transactions_csv.display()))?;
        let balances = read_balances(
            csv::Reader::from_path(balances_csv)
                .with_context(|| format!("opening {}", balances_csv.display()))?,
        )
        .with_context(|| format!("loading {}", balances_csv.display()))?;

        metrics::counter!("ranker_transactions_loaded_total")
            .increment(transactions.rows.len() as u64);
        metrics::counter!("ranker_balances_loaded_total").increment(balances.rows.len() as u64);
        tracing::info!(
            transactions = transactions.rows.len(),
            balances = balances.rows.len(),
            "row store loaded"
        );

        Ok(Self {
            transactions,
            balances,
        })
    }

    pub fn save(&self, transactions_csv: &Path, balances_csv: &Path) -> Result<()> {
        write_table(
            csv::WriterBuilder::new()
                .has_headers(false)
                .from_path(transactions_csv)
                .with_context(|| format!("creating {}", transactions_csv.display()))?,
            TRANSACTION_COLUMNS,
            self.transactions.rows(),
        )?;
        write_table(
            csv::WriterBuilder::new()
                .has_headers(false)
                .from_path(balances_csv)
                .with_context(|| format!("creating {}", balances_csv.display()))?,
            BALANCE_COLUMNS,
            self.balances.rows(),
        )?;
        Ok(())
    }

    pub fn wallet_count(&self) -> usize {
        self.transactions
            .rows()
            .iter()
            .map(|r| r.wallet_address.as_str())
            .chain(self.balances.rows().iter().map(|r| r.wallet_address.as_str()))
            .collect::<BTreeSet<_>>()
            .len()
    }
}

fn write_table<W: std::io::Write, R: Serialize>(
    mut writer: csv::Writer<W>,
    layout: &[(&str, &[&str])],
    rows: &[R],
) -> Result<()> {
    // Header written explicitly so empty tables still carry it.
    writer.write_record(layout.iter().map(|(c, _)| *c))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Resolves header positions and parses typed cells for one table.
struct Columns {
    table: &'static str,
    index: HashMap<&'static str, usize>,
}

impl Columns {
    fn resolve(
        table: &'static str,
        headers: &csv::StringRecord,
        layout: &[(&'static str, &[&str])],
    ) -> std::result::Result<Self, SchemaError> {
        let mut index = HashMap::new();
        for (pos, header) in headers.iter().enumerate() {
            let header = header.trim();
            if let Some((canonical, _)) = layout
                .iter()
                .find(|(c, aliases)| *c == header || aliases.contains(&header))
            {
                index.entry(*canonical).or_insert(pos);
            }
        }
        if !index.contains_key("wallet_address") {
            return Err(SchemaError::MissingColumn {
                table,
                column: "wallet_address",
            });
        }
        Ok(Self { table, index })
    }

    fn present(&self) -> BTreeSet<&'static str> {
        self.index.keys().copied().collect()
    }

    fn text<'r>(&self, record: &'r csv::StringRecord, column: &str) -> Option<&'r str> {
        self.index
            .get(column)
            .and_then(|&pos| record.get(pos))
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    fn owned(&self, record: &csv::StringRecord, column: &str) -> Option<String> {
        self.text(record, column).map(str::to_string)
    }

    fn invalid(&self, record: &csv::StringRecord, column: &'static str) -> SchemaError {
        SchemaError::InvalidValue {
            table: self.table,
            column,
            line: record.position().map_or(0, csv::Position::line),
            value: self.text(record, column).unwrap_or_default().to_string(),
        }
    }

    /// Absent column yields `default`; a present but empty or malformed cell is an error.
    fn required<T: FromStr>(
        &self,
        record: &csv::StringRecord,
        column: &'static str,
        default: T,
    ) -> std::result::Result<T, SchemaError> {
        if !self.index.contains_key(column) {
            return Ok(default);
        }
        self.text(record, column)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| self.invalid(record, column))
    }

    fn optional<T: FromStr>(
        &self,
        record: &csv::StringRecord,
        column: &'static str,
    ) -> std::result::Result<Option<T>, SchemaError> {
        match self.text(record, column) {
            None => Ok(None),
            Some(s) => s
                .parse()
                .map(Some)
                .map_err(|_| self.invalid(record, column)),
        }
    }

    fn timestamp(
        &self,
        record: &csv::StringRecord,
    ) -> std::result::Result<DateTime<Utc>, SchemaError> {
        if !self.index.contains_key("timestamp") {
            return Ok(DateTime::<Utc>::default());
        }
        self.text(record, "timestamp")
            .and_then(parse_timestamp)
            .ok_or_else(|| self.invalid(record, "timestamp"))
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn read_transactions<R: std::io::Read>(
    mut reader: csv::Reader<R>,
) -> Result<Table<TransactionRecord>> {
    let cols = Columns::resolve(TRANSACTIONS, reader.headers()?, TRANSACTION_COLUMNS)?;
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(TransactionRecord {
            wallet_address: cols.owned(&record, "wallet_address").unwrap_or_default(),
            tx_hash: cols.owned(&record, "tx_hash").unwrap_or_default(),
            timestamp: cols.timestamp(&record)?,
            amount: cols.required(&record, "amount", 0.0)?,
            from_user: cols.owned(&record, "from_user"),
            to_user: cols.owned(&record, "to_user"),
            token_amount: cols.optional(&record, "token_amount")?,
            mint: cols.owned(&record, "mint"),
            fee: cols
                .optional::<Decimal>(&record, "fee")?
                .unwrap_or(Decimal::ZERO),
        });
    }
    Ok(Table {
        name: TRANSACTIONS,
        columns: cols.present(),
        rows,
    })
}

fn read_balances<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<Table<BalanceRecord>> {
    let cols = Columns::resolve(BALANCES, reader.headers()?, BALANCE_COLUMNS)?;
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let asset_type = match cols.text(&record, "asset_type") {
            None => AssetType::Token,
            Some(s) => AssetType::parse(s).ok_or_else(|| cols.invalid(&record, "asset_type"))?,
        };
        rows.push(BalanceRecord {
            wallet_address: cols.owned(&record, "wallet_address").unwrap_or_default(),
            asset_type,
            token_account: cols.owned(&record, "token_account"),
            mint: cols.owned(&record, "mint"),
            amount: cols.required(&record, "amount", 0.0)?,
            decimals: cols.optional(&record, "decimals")?.unwrap_or(0),
            symbol: cols.owned(&record, "symbol"),
            nft_name: cols.owned(&record, "nft_name"),
            nft_image: cols.owned(&record, "nft_image"),
        });
    }
    Ok(Table {
        name: BALANCES,
        columns: cols.present(),
        rows,
    })
}
