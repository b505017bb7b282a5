use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::Config;
use crate::limits::{Clock, EditGate, QuotaLedger, SnapshotCache};

pub mod canvas;
pub mod config;
pub mod database;
pub mod error;
pub mod limits;
pub mod middleware;
pub mod router;
pub mod routes;
pub mod utils;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    pub clock: Arc<dyn Clock>,
    pub quotas: QuotaLedger,
    pub edit_gate: EditGate,
    pub snapshot: Arc<SnapshotCache>,
}

impl AppState {
    /// Wires the abuse controls to `pool`, all reading time from `clock`.
    pub fn new(pool: SqlitePool, config: Config, clock: Arc<dyn Clock>) -> Self {
        let quotas = QuotaLedger::new(pool.clone(), clock.clone());
        let edit_gate = EditGate::new(pool.clone(), clock.clone(), config.edit_cooldown());
        let snapshot = Arc::new(SnapshotCache::new(clock.clone()));
        AppState {
            pool,
            config,
            clock,
            quotas,
            edit_gate,
            snapshot,
        }
    }
}
