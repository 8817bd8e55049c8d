use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use common::config::Config;
use common::db::{Database, StoredRanking};
use common::helius::HeliusClient;
use common::types::RankingKind;

use crate::features::{compute_features, WideFeatureTable};
use crate::fetch::{fetch_wallets, read_wallet_list};
use crate::model_ranking::{rank_with_model, MeanOfFeatures, ModelConfig};
use crate::preprocess::preprocess;
use crate::report;
use crate::row_store::RowStore;
use crate::weighted_ranking::{rank_wallets, RankingWeights};

const TOP_N: u32 = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run,
    Fetch,
    Features,
    Rank,
    Train,
    Rankings { kind: RankingKind },
    Wallet { address: String },
}

pub fn parse_args<I>(mut args: I) -> std::result::Result<Command, String>
where
    I: Iterator<Item = String>,
{
    // Drop argv[0].
    let _ = args.next();

    let Some(cmd) = args.next() else {
        return Ok(Command::Run);
    };

    match cmd.as_str() {
        "run" => Ok(Command::Run),
        "fetch" => Ok(Command::Fetch),
        "features" => Ok(Command::Features),
        "rank" => Ok(Command::Rank),
        "train" => Ok(Command::Train),
        "rankings" => {
            let kind = match args.next() {
                None => RankingKind::Weighted,
                Some(k) => RankingKind::parse(&k)
                    .ok_or_else(|| format!("unknown ranking kind: {k} (weighted|model)"))?,
            };
            Ok(Command::Rankings { kind })
        }
        "wallet" => {
            let address = args
                .next()
                .ok_or_else(|| "usage: ranker wallet <address>".to_string())?;
            Ok(Command::Wallet { address })
        }
        other => Err(format!("unknown command: {other}")),
    }
}

pub async fn run_command(cfg: &Config, cmd: Command) -> Result<()> {
    match cmd {
        Command::Run => run_pipeline(cfg),
        Command::Fetch => fetch(cfg).await,
        Command::Features => {
            let features = compute_features(&load_store(cfg)?);
            write_feature_report(cfg, &features)
        }
        Command::Rank => {
            let features = compute_features(&load_store(cfg)?);
            weighted(cfg, &features, &mut open_db(cfg)?)
        }
        Command::Train => {
            let features = compute_features(&load_store(cfg)?);
            model(cfg, &features, &mut open_db(cfg)?)
        }
        Command::Rankings { kind } => show_rankings(&open_db(cfg)?, kind),
        Command::Wallet { address } => show_wallet(&open_db(cfg)?, &address),
    }
}

/// Create the data directory and the database's parent directory.
pub fn prepare_dirs(cfg: &Config) -> Result<()> {
    std::fs::create_dir_all(&cfg.data.dir)
        .with_context(|| format!("creating {}", cfg.data.dir))?;
    if let Some(parent) = Path::new(&cfg.database.path).parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    Ok(())
}

fn open_db(cfg: &Config) -> Result<Database> {
    let db = Database::open(&cfg.database.path)
        .with_context(|| format!("opening {}", cfg.database.path))?;
    db.run_migrations()?;
    Ok(db)
}

fn load_store(cfg: &Config) -> Result<RowStore> {
    RowStore::load(&cfg.data.transactions_path(), &cfg.data.balances_path())
}

fn stored(wallet_address: &str, score: f64, rank: usize) -> StoredRanking {
    StoredRanking {
        wallet_address: wallet_address.to_string(),
        score: Some(score).filter(|s| !s.is_nan()),
        rank,
    }
}

fn run_pipeline(cfg: &Config) -> Result<()> {
    let store = load_store(cfg)?;
    let features = compute_features(&store);
    if features.is_empty() {
        tracing::warn!(
            wallets = store.wallet_count(),
            "no wallet produced any metric; rankings will be empty"
        );
    }
    write_feature_report(cfg, &features)?;

    let mut db = open_db(cfg)?;
    weighted(cfg, &features, &mut db)?;
    model(cfg, &features, &mut db)?;
    tracing::info!(wallets = features.len(), "pipeline done");
    Ok(())
}

fn write_feature_report(cfg: &Config, features: &WideFeatureTable) -> Result<()> {
    report::write_file(&cfg.data.features_path(), |f| {
        report::write_features(f, features)
    })
}

fn weighted(cfg: &Config, features: &WideFeatureTable, db: &mut Database) -> Result<()> {
    let weights = RankingWeights::from(&cfg.weighted_ranking);
    let ranked = rank_wallets(features, &weights);
    report::write_file(&cfg.data.rankings_path(), |f| {
        report::write_weighted_rankings(f, &ranked)
    })?;

    let entries: Vec<StoredRanking> = ranked
        .iter()
        .map(|r| stored(&r.features.wallet_address, r.score, r.rank))
        .collect();
    let run_id = db.record_run(RankingKind::Weighted, &entries, None)?;
    tracing::info!(run_id, wallets = entries.len(), "weighted ranking recorded");
    Ok(())
}

fn model(cfg: &Config, features: &WideFeatureTable, db: &mut Database) -> Result<()> {
    let normalized = preprocess(features);
    report::write_file(&cfg.data.clean_features_path(), |f| {
        report::write_normalized(f, &normalized)
    })?;

    let (trained, predictions) =
        rank_with_model(&normalized, &MeanOfFeatures, &ModelConfig::from(&cfg.model))?;
    report::write_file(&cfg.data.predictions_path(), |f| {
        report::write_predictions(f, &predictions)
    })?;

    let entries: Vec<StoredRanking> = predictions
        .iter()
        .map(|p| stored(&p.wallet_address, p.predicted_score, p.predicted_rank))
        .collect();
    let run_id = db.record_run(RankingKind::Model, &entries, trained.holdout_mae)?;
    tracing::info!(
        run_id,
        train = trained.train_size,
        test = trained.test_size,
        holdout_mae = ?trained.holdout_mae,
        "model ranking recorded"
    );
    Ok(())
}

async fn fetch(cfg: &Config) -> Result<()> {
    let api_key = std::env::var(&cfg.helius.api_key_env)
        .with_context(|| format!("{} is not set", cfg.helius.api_key_env))?;
    let client = HeliusClient::new(
        &cfg.helius.api_url,
        &api_key,
        Duration::from_secs(cfg.helius.request_timeout_secs),
    )?;

    let wallets = read_wallet_list(&cfg.data.wallet_list_path())?;
    tracing::info!(wallets = wallets.len(), "fetching wallet ledgers");
    let store = fetch_wallets(
        &client,
        &wallets,
        Duration::from_millis(cfg.helius.rate_limit_delay_ms),
    )
    .await;
    store.save(&cfg.data.transactions_path(), &cfg.data.balances_path())
}

fn format_score(score: Option<f64>) -> String {
    score.map_or_else(|| "-".to_string(), |s| format!("{s:.4}"))
}

fn show_rankings(db: &Database, kind: RankingKind) -> Result<()> {
    println!("Latest {} rankings (top {TOP_N}):", kind.as_str());
    for r in db.latest_rankings(kind, TOP_N)? {
        println!(
            "{:>4}  {:>12}  {}",
            r.rank,
            format_score(r.score),
            r.wallet_address
        );
    }
    Ok(())
}

fn show_wallet(db: &Database, address: &str) -> Result<()> {
    println!("Wallet: {address}");
    let history = db.wallet_history(address)?;
    if history.is_empty() {
        println!("  (no recorded rankings)");
    }
    for h in history {
        println!(
            "  run={}  {}  {:<8}  rank={}  score={}",
            h.run_id,
            h.created_at,
            h.kind,
            h.rank,
            format_score(h.score)
        );
    }
    Ok(())
}
