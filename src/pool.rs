// Pool Allocation Engine - collective compliance
//
// Given a batch of routes for one period, recomputes each member's
// compliance balance from stored readings (the ledger is the source of
// truth - caller-supplied balances are never accepted), validates that the
// routes may legally pool, and redistributes surplus to deficits with a
// deterministic greedy pass. The pool is persisted only after every
// validation holds; no partial pool is ever formed.

use std::sync::Arc;

use serde::Serialize;

use crate::config::EngineConfig;
use crate::error::{ComplianceError, RejectReason};
use crate::math;
use crate::ports::{PoolStore, ReadingStore};
use crate::types::Pool;

/// Request to form a pool for one compliance period.
#[derive(Debug, Clone)]
pub struct PoolRequest {
    pub pool_id: String,
    pub pool_name: String,
    pub route_ids: Vec<String>,
    pub period: String,
}

/// How a member entered the pool, before any reallocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberState {
    Deficit,
    Surplus,
    Compliant,
}

/// One member's balance before and after allocation. Transient: reported
/// back to the caller, never persisted as its own entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberAllocation {
    pub route_id: String,
    pub before_cb: f64,
    pub after_cb: f64,
    pub initial_state: MemberState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PoolOutcome {
    Accepted {
        total_cb: f64,
        members: Vec<MemberAllocation>,
    },
    Rejected {
        reason: RejectReason,
    },
}

impl PoolOutcome {
    pub fn accepted(&self) -> bool {
        matches!(self, PoolOutcome::Accepted { .. })
    }

    pub fn reason(&self) -> Option<&RejectReason> {
        match self {
            PoolOutcome::Accepted { .. } => None,
            PoolOutcome::Rejected { reason } => Some(reason),
        }
    }
}

pub struct PoolEngine {
    config: EngineConfig,
    readings: Arc<dyn ReadingStore>,
    pools: Arc<dyn PoolStore>,
}

impl PoolEngine {
    pub fn new(
        config: EngineConfig,
        readings: Arc<dyn ReadingStore>,
        pools: Arc<dyn PoolStore>,
    ) -> Self {
        PoolEngine {
            config,
            readings,
            pools,
        }
    }

    /// Validate, allocate, and persist a pool.
    ///
    /// Rejections come back as `PoolOutcome::Rejected`; a batch with no
    /// stored readings at all is the hard failure `NotFound`.
    pub fn create_pool(&self, request: &PoolRequest) -> Result<PoolOutcome, ComplianceError> {
        if request.route_ids.is_empty() {
            return Ok(PoolOutcome::Rejected {
                reason: RejectReason::EmptyPool,
            });
        }

        let readings = self
            .readings
            .fetch_batch_readings(&request.route_ids, &request.period)?;
        if readings.is_empty() {
            return Err(ComplianceError::NotFound(
                "no compliance records found".to_string(),
            ));
        }

        let missing: Vec<String> = request
            .route_ids
            .iter()
            .filter(|id| !readings.iter().any(|r| &r.route_id == *id))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Ok(PoolOutcome::Rejected {
                reason: RejectReason::MissingReadings { route_ids: missing },
            });
        }

        // Recompute every member's balance in input order.
        let mut members = Vec::with_capacity(readings.len());
        for reading in &readings {
            let cb = math::compliance_balance(
                self.config.target_intensity,
                reading.actual_intensity,
                reading.fuel_consumption,
                self.config.energy_factor,
            )?;
            let initial_state = if cb < 0.0 {
                MemberState::Deficit
            } else if cb > 0.0 {
                MemberState::Surplus
            } else {
                MemberState::Compliant
            };
            members.push(MemberAllocation {
                route_id: reading.route_id.clone(),
                before_cb: cb,
                after_cb: cb,
                initial_state,
            });
        }

        let total_cb: f64 = members.iter().map(|m| m.before_cb).sum();
        if total_cb < 0.0 {
            // Zero aggregate is legal; only a strictly negative sum fails.
            return Ok(PoolOutcome::Rejected {
                reason: RejectReason::NegativeAggregateBalance { total: total_cb },
            });
        }

        allocate_surplus(&mut members);

        // Post-allocation validation: monotonic improvement for deficits,
        // no surplus member below zero.
        for m in &members {
            if m.initial_state == MemberState::Deficit && m.after_cb < m.before_cb {
                return Ok(PoolOutcome::Rejected {
                    reason: RejectReason::DeficitWorsened {
                        route_id: m.route_id.clone(),
                    },
                });
            }
        }
        for m in &members {
            if m.initial_state == MemberState::Surplus && m.after_cb < 0.0 {
                return Ok(PoolOutcome::Rejected {
                    reason: RejectReason::SurplusWentNegative {
                        route_id: m.route_id.clone(),
                    },
                });
            }
        }

        let pool = Pool {
            id: request.pool_id.clone(),
            name: request.pool_name.clone(),
            member_route_ids: members.iter().map(|m| m.route_id.clone()).collect(),
        };
        self.pools.create_pool(&pool)?;

        Ok(PoolOutcome::Accepted { total_cb, members })
    }
}

/// Greedy redistribution of surplus to deficits.
///
/// Surplus is consumed in aggregate: which surplus member nominally funds
/// which deficit is not tracked, and surplus members' own after_cb values
/// are left untouched - only the aggregate counter is drawn down. The
/// nominal funding order is still fixed (descending balance, input order on
/// ties) so the computation is reproducible. Deficits are relieved in input
/// order; once the aggregate runs out, remaining deficits stay as they are.
fn allocate_surplus(members: &mut [MemberAllocation]) {
    // Surplus set: surplus members, plus compliant members whose balance
    // sits above zero (empty by construction, kept for boundary floats).
    let mut surplus_idx: Vec<usize> = members
        .iter()
        .enumerate()
        .filter(|(_, m)| {
            m.initial_state == MemberState::Surplus
                || (m.initial_state == MemberState::Compliant && m.before_cb > 0.0)
        })
        .map(|(i, _)| i)
        .collect();
    surplus_idx.sort_by(|&a, &b| members[b].before_cb.total_cmp(&members[a].before_cb));

    let mut available_surplus: f64 = surplus_idx.iter().map(|&i| members[i].before_cb).sum();

    for member in members
        .iter_mut()
        .filter(|m| m.initial_state == MemberState::Deficit)
    {
        let need = member.after_cb.abs();
        if available_surplus >= need {
            member.after_cb = 0.0;
            available_surplus -= need;
        } else {
            // Partial relief; no surplus remains for later deficits.
            member.after_cb += available_surplus;
            available_surplus = 0.0;
            break;
        }
    }
}
