// Collaborator seam
//
// The engines depend on these traits, never on SQLite directly. The bundled
// implementation lives in db.rs; anything that supplies readings and
// durably records balances, bank entries, and pools can stand in.

use crate::error::ComplianceError;
use crate::types::{IntensityReading, Pool, Route};

pub trait RouteStore: Send + Sync {
    fn all_routes(&self) -> Result<Vec<Route>, ComplianceError>;

    fn route_by_id(&self, id: &str) -> Result<Option<Route>, ComplianceError>;
}

pub trait ReadingStore: Send + Sync {
    /// Fuel consumption and measured intensity for one route/period.
    fn fetch_reading(
        &self,
        route_id: &str,
        period: &str,
    ) -> Result<Option<IntensityReading>, ComplianceError>;

    /// Batch form for pool allocation. Routes with no matching record are
    /// simply absent from the result; the result preserves the order of
    /// `route_ids`.
    fn fetch_batch_readings(
        &self,
        route_ids: &[String],
        period: &str,
    ) -> Result<Vec<IntensityReading>, ComplianceError>;
}

pub trait BankLedger: Send + Sync {
    /// Append a new immutable bank-entry record.
    fn append_entry(&self, route_id: &str, amount: f64, period: &str)
        -> Result<(), ComplianceError>;

    /// Cumulative previously banked amount for a route, summed across all
    /// periods.
    fn total_banked(&self, route_id: &str) -> Result<f64, ComplianceError>;
}

pub trait ComplianceStore: Send + Sync {
    /// Overwrite semantics keyed by (route_id, period): a repeat computation
    /// for the same key replaces the prior stored balance.
    fn upsert_balance(
        &self,
        route_id: &str,
        period: &str,
        balance: f64,
    ) -> Result<(), ComplianceError>;

    fn balance(&self, route_id: &str, period: &str) -> Result<Option<f64>, ComplianceError>;
}

/// Combined persistence surface for an accepted banking decision.
pub trait BankingStore: BankLedger + ComplianceStore {
    /// Record the period's balance and the ledger entry together.
    ///
    /// The default body runs the two writes in sequence: a failure between
    /// them leaves the balance written without its entry, which the caller
    /// sees as a plain persistence failure with partial state. Stores that
    /// can do better must override this with a single transaction (the
    /// bundled SQLite store does).
    fn commit_banking(
        &self,
        route_id: &str,
        period: &str,
        balance: f64,
        amount: f64,
    ) -> Result<(), ComplianceError> {
        self.upsert_balance(route_id, period, balance)?;
        self.append_entry(route_id, amount, period)
    }
}

pub trait PoolStore: Send + Sync {
    /// Persist a pool and its ordered membership. Creating a pool whose id
    /// already exists is a no-op.
    fn create_pool(&self, pool: &Pool) -> Result<(), ComplianceError>;

    fn pool_by_id(&self, id: &str) -> Result<Option<Pool>, ComplianceError>;
}
