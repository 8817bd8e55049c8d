use anyhow::Result;
use rusqlite::Connection;

use crate::types::RankingKind;

pub struct Database {
    pub conn: Connection,
}

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS ranking_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    wallet_count INTEGER NOT NULL,
    holdout_mae REAL
);

CREATE TABLE IF NOT EXISTS wallet_rankings (
    run_id INTEGER NOT NULL REFERENCES ranking_runs(id),
    wallet_address TEXT NOT NULL,
    score REAL,
    rank INTEGER NOT NULL,
    PRIMARY KEY (run_id, wallet_address)
);

CREATE INDEX IF NOT EXISTS idx_wallet_rankings_wallet ON wallet_rankings(wallet_address);
";

/// One ranked wallet as persisted for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRanking {
    pub wallet_address: String,
    /// `None` when the score was NaN (SQLite stores NaN as NULL).
    pub score: Option<f64>,
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WalletHistoryRow {
    pub run_id: i64,
    pub kind: String,
    pub created_at: String,
    pub score: Option<f64>,
    pub rank: usize,
}

impl Database {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(30))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    pub fn run_migrations(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Persist one ranking run atomically and return its id.
    pub fn record_run(
        &mut self,
        kind: RankingKind,
        entries: &[StoredRanking],
        holdout_mae: Option<f64>,
    ) -> Result<i64> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO ranking_runs (kind, wallet_count, holdout_mae) VALUES (?1, ?2, ?3)",
            rusqlite::params![kind.as_str(), entries.len(), holdout_mae],
        )?;
        let run_id = tx.last_insert_rowid();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO wallet_rankings (run_id, wallet_address, score, rank) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for e in entries {
                stmt.execute(rusqlite::params![
                    run_id,
                    e.wallet_address,
                    e.score,
                    e.rank
                ])?;
            }
        }
        tx.commit()?;
        Ok(run_id)
    }

    /// Top `limit` wallets of the most recent run of `kind`, best rank first.
    pub fn latest_rankings(&self, kind: RankingKind, limit: u32) -> Result<Vec<StoredRanking>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT wallet_address, score, rank
            FROM wallet_rankings
            WHERE run_id = (SELECT MAX(id) FROM ranking_runs WHERE kind = ?1)
            ORDER BY rank ASC, wallet_address ASC
            LIMIT ?2
            ",
        )?;
        let rows = stmt.query_map(rusqlite::params![kind.as_str(), limit], |row| {
            Ok(StoredRanking {
                wallet_address: row.get(0)?,
                score: row.get(1)?,
                rank: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Every persisted ranking of `address`, newest run first.
    pub fn wallet_history(&self, address: &str) -> Result<Vec<WalletHistoryRow>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT r.id, r.kind, r.created_at, w.score, w.rank
            FROM wallet_rankings w
            INNER JOIN ranking_runs r ON r.id = w.run_id
            WHERE w.wallet_address = ?1
            ORDER BY r.id DESC
            ",
        )?;
        let rows = stmt.query_map([address], |row| {
            Ok(WalletHistoryRow {
                run_id: row.get(0)?,
                kind: row.get(1)?,
                created_at: row.get(2)?,
                score: row.get(3)?,
                rank: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(wallet: &str, score: f64, rank: usize) -> StoredRanking {
        StoredRanking {
            wallet_address: wallet.to_string(),
            score: Some(score),
            rank,
        }
    }

    #[test]
    fn test_migrations_create_tables() {
        let db = Database::open(":memory:").unwrap();
        db.run_migrations().unwrap();

        let tables: Vec<String> = db
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(std::result::Result::ok)
            .collect();

        assert!(tables.contains(&"ranking_runs".to_string()));
        assert!(tables.contains(&"wallet_rankings".to_string()));
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let db = Database::open(":memory:").unwrap();
        db.run_migrations().unwrap();
        db.run_migrations().unwrap();
    }

    #[test]
    fn test_latest_rankings_reads_most_recent_run_of_kind() {
        let mut db = Database::open(":memory:").unwrap();
        db.run_migrations().unwrap();

        db.record_run(RankingKind::Weighted, &[entry("old", 1.0, 1)], None)
            .unwrap();
        db.record_run(
            RankingKind::Weighted,
            &[entry("b", 2.0, 2), entry("a", 5.0, 1)],
            None,
        )
        .unwrap();
        db.record_run(RankingKind::Model, &[entry("m", 0.5, 1)], Some(0.01))
            .unwrap();

        let rows = db.latest_rankings(RankingKind::Weighted, 20).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].wallet_address, "a");
        assert_eq!(rows[1].wallet_address, "b");

        let model = db.latest_rankings(RankingKind::Model, 20).unwrap();
        assert_eq!(model, vec![entry("m", 0.5, 1)]);
    }

    #[test]
    fn test_nan_score_round_trips_as_none() {
        let mut db = Database::open(":memory:").unwrap();
        db.run_migrations().unwrap();
        db.record_run(RankingKind::Weighted, &[entry("n", f64::NAN, 1)], None)
            .unwrap();
        let rows = db.latest_rankings(RankingKind::Weighted, 1).unwrap();
        assert!(rows[0].score.is_none());
    }
}
