// Banking Engine - surplus carryover
//
// Decides whether a "bank surplus" request for a route/period is admissible
// and, if so, commits it: the period's computed balance is upserted and an
// immutable bank entry appended, in one collaborator call. Side effects
// happen only on acceptance.

use std::sync::Arc;

use serde::Serialize;

use crate::config::EngineConfig;
use crate::error::{ComplianceError, RejectReason};
use crate::math;
use crate::ports::BankingStore;

/// Request to carry forward surplus compliance for a route/period.
#[derive(Debug, Clone)]
pub struct BankingRequest {
    pub route_id: String,
    pub fuel_consumption: f64,
    pub actual_intensity: f64,
    pub amount_to_bank: f64,
    /// Overrides the configured target intensity when set.
    pub target: Option<f64>,
    pub period: String,
}

/// Result of a banking decision. Rejections are expected outcomes, not
/// errors; both variants carry the balance computed for the request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BankingOutcome {
    Accepted {
        compliance_balance: f64,
        energy_in_scope: f64,
        amount_banked: f64,
    },
    Rejected {
        reason: RejectReason,
        compliance_balance: f64,
        energy_in_scope: f64,
    },
}

impl BankingOutcome {
    pub fn accepted(&self) -> bool {
        matches!(self, BankingOutcome::Accepted { .. })
    }

    pub fn reason(&self) -> Option<&RejectReason> {
        match self {
            BankingOutcome::Accepted { .. } => None,
            BankingOutcome::Rejected { reason, .. } => Some(reason),
        }
    }

    pub fn compliance_balance(&self) -> f64 {
        match self {
            BankingOutcome::Accepted {
                compliance_balance, ..
            }
            | BankingOutcome::Rejected {
                compliance_balance, ..
            } => *compliance_balance,
        }
    }
}

pub struct BankingEngine {
    config: EngineConfig,
    store: Arc<dyn BankingStore>,
}

impl BankingEngine {
    pub fn new(config: EngineConfig, store: Arc<dyn BankingStore>) -> Self {
        BankingEngine { config, store }
    }

    /// Validate and, on acceptance, commit a surplus carryover.
    ///
    /// The ceiling is cumulative-plus-current: previously banked surplus
    /// must not be double-spent, but it is not a hard cap in isolation
    /// either - `total_banked + cb` is what the request is checked against.
    pub fn bank_surplus(
        &self,
        request: &BankingRequest,
    ) -> Result<BankingOutcome, ComplianceError> {
        if !request.amount_to_bank.is_finite() || request.amount_to_bank < 0.0 {
            return Err(ComplianceError::InvalidInput(
                "amount to bank must be a finite, non-negative number".to_string(),
            ));
        }

        let target = request.target.unwrap_or(self.config.target_intensity);
        let cb = math::compliance_balance(
            target,
            request.actual_intensity,
            request.fuel_consumption,
            self.config.energy_factor,
        )?;
        let energy = math::energy_in_scope(request.fuel_consumption, self.config.energy_factor)?;

        if cb <= 0.0 {
            return Ok(BankingOutcome::Rejected {
                reason: RejectReason::NonPositiveBalance { balance: cb },
                compliance_balance: cb,
                energy_in_scope: energy,
            });
        }

        let total_banked = self.store.total_banked(&request.route_id)?;
        let available = total_banked + cb;
        if request.amount_to_bank > available {
            return Ok(BankingOutcome::Rejected {
                reason: RejectReason::ExceedsAvailableSurplus {
                    requested: request.amount_to_bank,
                    available,
                },
                compliance_balance: cb,
                energy_in_scope: energy,
            });
        }

        self.store.commit_banking(
            &request.route_id,
            &request.period,
            cb,
            request.amount_to_bank,
        )?;

        Ok(BankingOutcome::Accepted {
            compliance_balance: cb,
            energy_in_scope: energy,
            amount_banked: request.amount_to_bank,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::ports::{BankLedger, ComplianceStore};

    // target 100 / factor 1 keeps the arithmetic legible: cb = (100 - actual) * fuel
    fn test_engine(store: Arc<SqliteStore>) -> BankingEngine {
        BankingEngine::new(EngineConfig::new(100.0, 1.0), store)
    }

    fn request(amount: f64) -> BankingRequest {
        // cb = (100 - 90) * 20 = 200
        BankingRequest {
            route_id: "r-1".to_string(),
            fuel_consumption: 20.0,
            actual_intensity: 90.0,
            amount_to_bank: amount,
            target: None,
            period: "2025".to_string(),
        }
    }

    #[test]
    fn test_accepts_within_cumulative_ceiling() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store.append_entry("r-1", 100.0, "2024").unwrap(); // totalBanked = 100
        let engine = test_engine(store.clone());

        // 250 <= 100 + 200
        let outcome = engine.bank_surplus(&request(250.0)).unwrap();
        assert!(outcome.accepted());
        assert_eq!(outcome.compliance_balance(), 200.0);

        // Acceptance persisted: balance cached, entry appended.
        assert_eq!(store.balance("r-1", "2025").unwrap(), Some(200.0));
        assert_eq!(store.total_banked("r-1").unwrap(), 350.0);
    }

    #[test]
    fn test_rejects_beyond_cumulative_ceiling() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store.append_entry("r-1", 100.0, "2024").unwrap();
        let engine = test_engine(store.clone());

        // 301 > 100 + 200
        let outcome = engine.bank_surplus(&request(301.0)).unwrap();
        assert!(!outcome.accepted());
        assert_eq!(
            outcome.reason(),
            Some(&RejectReason::ExceedsAvailableSurplus {
                requested: 301.0,
                available: 300.0,
            })
        );

        // No writes on rejection.
        assert_eq!(store.balance("r-1", "2025").unwrap(), None);
        assert_eq!(store.total_banked("r-1").unwrap(), 100.0);
    }

    #[test]
    fn test_rejects_non_positive_balance_regardless_of_amount() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let engine = test_engine(store.clone());

        // actual at target: cb == 0
        let mut req = request(0.0);
        req.actual_intensity = 100.0;
        let outcome = engine.bank_surplus(&req).unwrap();
        assert!(matches!(
            outcome.reason(),
            Some(RejectReason::NonPositiveBalance { .. })
        ));

        // actual above target: cb < 0, even a tiny amount is rejected
        let mut req = request(0.001);
        req.actual_intensity = 110.0;
        let outcome = engine.bank_surplus(&req).unwrap();
        assert!(matches!(
            outcome.reason(),
            Some(RejectReason::NonPositiveBalance { .. })
        ));
        assert!(outcome.compliance_balance() < 0.0);

        assert_eq!(store.balance("r-1", "2025").unwrap(), None);
        assert_eq!(store.total_banked("r-1").unwrap(), 0.0);
    }

    #[test]
    fn test_explicit_target_override() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let engine = test_engine(store);

        // With target 80, actual 90 is a deficit even though the configured
        // target (100) would call it a surplus.
        let mut req = request(1.0);
        req.target = Some(80.0);
        let outcome = engine.bank_surplus(&req).unwrap();
        assert!(!outcome.accepted());
        assert_eq!(outcome.compliance_balance(), (80.0 - 90.0) * 20.0);
    }

    #[test]
    fn test_repeat_banking_overwrites_stored_balance() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let engine = test_engine(store.clone());

        assert!(engine.bank_surplus(&request(10.0)).unwrap().accepted());
        assert_eq!(store.balance("r-1", "2025").unwrap(), Some(200.0));

        // Second evaluation for the same period with new measurements:
        // the stored balance is an idempotent upsert, the ledger grows.
        let mut req = request(10.0);
        req.fuel_consumption = 30.0; // cb = 300
        assert!(engine.bank_surplus(&req).unwrap().accepted());
        assert_eq!(store.balance("r-1", "2025").unwrap(), Some(300.0));
        assert_eq!(store.total_banked("r-1").unwrap(), 20.0);
    }

    #[test]
    fn test_invalid_amount_fails_before_any_io() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let engine = test_engine(store.clone());

        for bad in [f64::NAN, f64::INFINITY, -5.0] {
            let result = engine.bank_surplus(&request(bad));
            assert!(matches!(result, Err(ComplianceError::InvalidInput(_))));
        }
        assert_eq!(store.total_banked("r-1").unwrap(), 0.0);
    }

    #[test]
    fn test_non_finite_intensity_fails_before_any_io() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let engine = test_engine(store.clone());

        let mut req = request(1.0);
        req.actual_intensity = f64::NAN;
        assert!(matches!(
            engine.bank_surplus(&req),
            Err(ComplianceError::InvalidInput(_))
        ));
        assert_eq!(store.total_banked("r-1").unwrap(), 0.0);
    }

    /// Store whose commit always fails, to check the failure is surfaced.
    struct BrokenStore {
        inner: SqliteStore,
    }

    impl BankLedger for BrokenStore {
        fn append_entry(
            &self,
            route_id: &str,
            amount: f64,
            period: &str,
        ) -> Result<(), ComplianceError> {
            self.inner.append_entry(route_id, amount, period)
        }

        fn total_banked(&self, route_id: &str) -> Result<f64, ComplianceError> {
            self.inner.total_banked(route_id)
        }
    }

    impl ComplianceStore for BrokenStore {
        fn upsert_balance(
            &self,
            route_id: &str,
            period: &str,
            balance: f64,
        ) -> Result<(), ComplianceError> {
            self.inner.upsert_balance(route_id, period, balance)
        }

        fn balance(&self, route_id: &str, period: &str) -> Result<Option<f64>, ComplianceError> {
            self.inner.balance(route_id, period)
        }
    }

    impl crate::ports::BankingStore for BrokenStore {
        fn commit_banking(
            &self,
            _route_id: &str,
            _period: &str,
            _balance: f64,
            _amount: f64,
        ) -> Result<(), ComplianceError> {
            Err(ComplianceError::Persistence(
                rusqlite::Error::QueryReturnedNoRows,
            ))
        }
    }

    #[test]
    fn test_persistence_failure_is_surfaced() {
        let store = Arc::new(BrokenStore {
            inner: SqliteStore::open_in_memory().unwrap(),
        });
        let engine = BankingEngine::new(EngineConfig::new(100.0, 1.0), store);

        let result = engine.bank_surplus(&request(50.0));
        assert!(matches!(result, Err(ComplianceError::Persistence(_))));
    }
}
