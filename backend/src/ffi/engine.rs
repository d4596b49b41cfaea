//! PyO3 wrapper for SettlementEngine
//!
//! # Example (from Python)
//!
//! ```python
//! from rosca_core_rs import SettlementEngine
//!
//! engine = SettlementEngine("admin", "treasury", 100)
//! pool = engine.create_pool("alice", '{"config": {"contribution_amount": 100}}', 0)
//! engine.join_pool(pool, "bob", 1)
//! print(engine.summary(pool))
//! ```

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::constants::DEFAULT_PENALTY_BPS;
use crate::core::address::PoolId;
use crate::error::EngineError;
use crate::models::pool::NewPool;
use crate::models::registry::ProtocolRegistry;
use crate::orchestrator::{EngineSnapshot, SettlementEngine};

fn to_py_err(err: EngineError) -> PyErr {
    if err.is_fatal() {
        PyRuntimeError::new_err(err.to_string())
    } else {
        PyValueError::new_err(err.to_string())
    }
}

fn parse_pool_id(pool_id: &str) -> PyResult<PoolId> {
    pool_id
        .parse()
        .map_err(|e| PyValueError::new_err(format!("Invalid pool id '{}': {}", pool_id, e)))
}

fn to_json<T: serde::Serialize>(value: &T) -> PyResult<String> {
    serde_json::to_string(value).map_err(|e| PyRuntimeError::new_err(e.to_string()))
}

/// Python wrapper owning an engine and its registry
#[pyclass(name = "SettlementEngine")]
pub struct PyEngine {
    inner: SettlementEngine,
    registry: ProtocolRegistry,
}

#[pymethods]
impl PyEngine {
    #[new]
    fn new(admin: &str, treasury: &str, fee_bps: u16) -> PyResult<Self> {
        let mut inner = SettlementEngine::new();
        let registry = inner
            .initialize_registry(admin, treasury, fee_bps, 0)
            .map_err(to_py_err)?;
        Ok(Self { inner, registry })
    }

    /// Restore from a JSON snapshot taken with the same registry settings
    #[staticmethod]
    #[pyo3(signature = (admin, treasury, fee_bps, snapshot, penalty_bps = DEFAULT_PENALTY_BPS))]
    fn from_snapshot(
        admin: &str,
        treasury: &str,
        fee_bps: u16,
        snapshot: &str,
        penalty_bps: u16,
    ) -> PyResult<Self> {
        let registry = ProtocolRegistry::from_parts(admin, treasury, fee_bps, penalty_bps)
            .map_err(to_py_err)?;
        let snapshot = EngineSnapshot::from_json(snapshot).map_err(to_py_err)?;
        let inner = SettlementEngine::restore(snapshot, &registry).map_err(to_py_err)?;
        Ok(Self { inner, registry })
    }

    fn update_fee(&mut self, caller: &str, fee_bps: u16, now: u64) -> PyResult<()> {
        self.inner
            .update_fee(&mut self.registry, caller, fee_bps, now)
            .map_err(to_py_err)
    }

    fn update_penalty(&mut self, caller: &str, penalty_bps: u16, now: u64) -> PyResult<()> {
        self.inner
            .update_penalty(&mut self.registry, caller, penalty_bps, now)
            .map_err(to_py_err)
    }

    fn fund_wallet(&mut self, owner: &str, amount: i64) -> PyResult<()> {
        self.inner.fund_wallet(owner, amount).map_err(to_py_err)
    }

    fn wallet_balance(&self, owner: &str) -> i64 {
        self.inner.wallet_balance(owner)
    }

    /// Create a pool from a JSON `NewPool`; returns the pool id
    fn create_pool(&mut self, creator: &str, request: &str, now: u64) -> PyResult<String> {
        let request: NewPool = serde_json::from_str(request)
            .map_err(|e| PyValueError::new_err(format!("Invalid pool request: {}", e)))?;
        let pool_id = self
            .inner
            .create_pool(&self.registry, creator, request, now)
            .map_err(to_py_err)?;
        Ok(pool_id.to_string())
    }

    fn join_pool(&mut self, pool_id: &str, member: &str, now: u64) -> PyResult<()> {
        let pool_id = parse_pool_id(pool_id)?;
        self.inner.join_pool(&pool_id, member, now).map_err(to_py_err)
    }

    fn contribute(&mut self, pool_id: &str, member: &str, amount: i64, now: u64) -> PyResult<()> {
        let pool_id = parse_pool_id(pool_id)?;
        self.inner
            .contribute(&pool_id, member, amount, now)
            .map_err(to_py_err)
    }

    fn place_bid(&mut self, pool_id: &str, member: &str, amount: i64, now: u64) -> PyResult<()> {
        let pool_id = parse_pool_id(pool_id)?;
        self.inner
            .place_bid(&pool_id, member, amount, now)
            .map_err(to_py_err)
    }

    fn close_bidding(&mut self, pool_id: &str, caller: &str, now: u64) -> PyResult<()> {
        let pool_id = parse_pool_id(pool_id)?;
        self.inner
            .close_bidding(&pool_id, caller, now)
            .map_err(to_py_err)
    }

    fn advance_cycle(&mut self, pool_id: &str, caller: &str, cycle: u8, now: u64) -> PyResult<()> {
        let pool_id = parse_pool_id(pool_id)?;
        self.inner
            .advance_cycle(&self.registry, &pool_id, caller, cycle, now)
            .map_err(to_py_err)
    }

    fn force_advance_cycle(&mut self, pool_id: &str, caller: &str, cycle: u8, now: u64) -> PyResult<()> {
        let pool_id = parse_pool_id(pool_id)?;
        self.inner
            .force_advance_cycle(&self.registry, &pool_id, caller, cycle, now)
            .map_err(to_py_err)
    }

    fn process_payout(&mut self, pool_id: &str, member: &str, cycle: u8, now: u64) -> PyResult<()> {
        let pool_id = parse_pool_id(pool_id)?;
        self.inner
            .process_payout(&self.registry, &pool_id, member, cycle, now)
            .map_err(to_py_err)
    }

    fn request_early_payout(&mut self, pool_id: &str, member: &str, cycle: u8, now: u64) -> PyResult<()> {
        let pool_id = parse_pool_id(pool_id)?;
        self.inner
            .request_early_payout(&self.registry, &pool_id, member, cycle, now)
            .map_err(to_py_err)
    }

    fn deposit_collateral(&mut self, pool_id: &str, member: &str, amount: i64, now: u64) -> PyResult<()> {
        let pool_id = parse_pool_id(pool_id)?;
        self.inner
            .deposit_collateral(&pool_id, member, amount, now)
            .map_err(to_py_err)
    }

    fn withdraw_collateral(&mut self, pool_id: &str, member: &str, now: u64) -> PyResult<()> {
        let pool_id = parse_pool_id(pool_id)?;
        self.inner
            .withdraw_collateral(&pool_id, member, now)
            .map_err(to_py_err)
    }

    fn close_pool(&mut self, pool_id: &str, caller: &str, now: u64) -> PyResult<()> {
        let pool_id = parse_pool_id(pool_id)?;
        self.inner.close_pool(&pool_id, caller, now).map_err(to_py_err)
    }

    /// Pool summary as JSON
    fn summary(&self, pool_id: &str) -> PyResult<String> {
        let pool_id = parse_pool_id(pool_id)?;
        let summary = self.inner.summary(&pool_id).map_err(to_py_err)?;
        to_json(&summary)
    }

    /// Full event log as a JSON array
    fn events(&self) -> PyResult<String> {
        to_json(&self.inner.event_log().events())
    }

    fn snapshot(&self) -> PyResult<String> {
        let snapshot = self.inner.snapshot(&self.registry).map_err(to_py_err)?;
        snapshot.to_json().map_err(to_py_err)
    }
}
