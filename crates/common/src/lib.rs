pub mod config;
pub mod db;
pub mod helius;
pub mod normalize;
pub mod observability;
pub mod types;
