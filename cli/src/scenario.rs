//! Scenario files: a registry, opening wallet balances, and a timed list of
//! operations replayed against a fresh engine.

use anyhow::{anyhow, Context, Result};
use rosca_core_rs::{EngineError, NewPool, PoolId, ProtocolRegistry, SettlementEngine};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct RegistrySetup {
    pub admin: String,
    pub treasury: String,
    #[serde(default)]
    pub fee_bps: u16,
}

#[derive(Debug, Deserialize)]
pub struct Scenario {
    pub registry: RegistrySetup,
    /// Opening external balances
    #[serde(default)]
    pub wallets: BTreeMap<String, i64>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
pub struct Step {
    /// Timestamp the operation runs at (seconds)
    pub at: u64,
    /// The step is expected to be rejected
    #[serde(default)]
    pub expect_error: bool,
    #[serde(flatten)]
    pub op: Op,
}

/// One engine operation. `pool` is either an alias given at creation or a
/// literal pool id. An omitted `cycle` means the cycle in progress.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    CreatePool {
        creator: String,
        #[serde(default)]
        alias: Option<String>,
        #[serde(default)]
        request: NewPool,
    },
    JoinPool {
        pool: String,
        member: String,
    },
    AddToWhitelist {
        pool: String,
        caller: String,
        member: String,
    },
    Contribute {
        pool: String,
        member: String,
        #[serde(default)]
        amount: Option<i64>,
    },
    PlaceBid {
        pool: String,
        member: String,
        amount: i64,
    },
    CloseBidding {
        pool: String,
        caller: String,
    },
    AdvanceCycle {
        pool: String,
        caller: String,
        #[serde(default)]
        cycle: Option<u8>,
    },
    ForceAdvanceCycle {
        pool: String,
        caller: String,
        #[serde(default)]
        cycle: Option<u8>,
    },
    ProcessPayout {
        pool: String,
        member: String,
        #[serde(default)]
        cycle: Option<u8>,
    },
    RequestEarlyPayout {
        pool: String,
        member: String,
        #[serde(default)]
        cycle: Option<u8>,
    },
    DepositCollateral {
        pool: String,
        member: String,
        amount: i64,
    },
    WithdrawCollateral {
        pool: String,
        member: String,
    },
    ClosePool {
        pool: String,
        caller: String,
    },
    UnfreezePool {
        pool: String,
        caller: String,
    },
    UpdateFee {
        caller: String,
        fee_bps: u16,
    },
    UpdateTreasury {
        caller: String,
        treasury: String,
    },
    UpdatePenalty {
        caller: String,
        penalty_bps: u16,
    },
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::CreatePool { .. } => "create_pool",
            Op::JoinPool { .. } => "join_pool",
            Op::AddToWhitelist { .. } => "add_to_whitelist",
            Op::Contribute { .. } => "contribute",
            Op::PlaceBid { .. } => "place_bid",
            Op::CloseBidding { .. } => "close_bidding",
            Op::AdvanceCycle { .. } => "advance_cycle",
            Op::ForceAdvanceCycle { .. } => "force_advance_cycle",
            Op::ProcessPayout { .. } => "process_payout",
            Op::RequestEarlyPayout { .. } => "request_early_payout",
            Op::DepositCollateral { .. } => "deposit_collateral",
            Op::WithdrawCollateral { .. } => "withdraw_collateral",
            Op::ClosePool { .. } => "close_pool",
            Op::UnfreezePool { .. } => "unfreeze_pool",
            Op::UpdateFee { .. } => "update_fee",
            Op::UpdateTreasury { .. } => "update_treasury",
            Op::UpdatePenalty { .. } => "update_penalty",
        }
    }
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing scenario {}", path.display()))
    }
}

/// Outcome of a replay
pub struct Replay {
    pub engine: SettlementEngine,
    pub registry: ProtocolRegistry,
    pub aliases: BTreeMap<String, PoolId>,
    pub rejected: usize,
}

struct Runner {
    engine: SettlementEngine,
    registry: ProtocolRegistry,
    aliases: BTreeMap<String, PoolId>,
}

impl Runner {
    fn resolve(&self, pool: &str) -> Result<PoolId> {
        if let Some(id) = self.aliases.get(pool) {
            return Ok(*id);
        }
        pool.parse()
            .map_err(|e| anyhow!("'{}' is neither a pool alias nor a pool id: {}", pool, e))
    }

    fn cycle(&self, pool_id: &PoolId, cycle: Option<u8>) -> Result<u8> {
        match cycle {
            Some(c) => Ok(c),
            None => Ok(self.engine.pool(pool_id)?.current_cycle()),
        }
    }

    fn apply(&mut self, op: &Op, now: u64) -> Result<std::result::Result<(), EngineError>> {
        let outcome = match op {
            Op::CreatePool {
                creator,
                alias,
                request,
            } => self
                .engine
                .create_pool(&self.registry, creator, request.clone(), now)
                .map(|pool_id| {
                    if let Some(alias) = alias {
                        self.aliases.insert(alias.clone(), pool_id);
                    }
                }),
            Op::JoinPool { pool, member } => {
                let pool_id = self.resolve(pool)?;
                self.engine.join_pool(&pool_id, member, now)
            }
            Op::AddToWhitelist {
                pool,
                caller,
                member,
            } => {
                let pool_id = self.resolve(pool)?;
                self.engine.add_to_whitelist(&pool_id, caller, member, now)
            }
            Op::Contribute {
                pool,
                member,
                amount,
            } => {
                let pool_id = self.resolve(pool)?;
                let amount = match amount {
                    Some(a) => *a,
                    None => self.engine.pool(&pool_id)?.config().contribution_amount,
                };
                self.engine.contribute(&pool_id, member, amount, now)
            }
            Op::PlaceBid {
                pool,
                member,
                amount,
            } => {
                let pool_id = self.resolve(pool)?;
                self.engine.place_bid(&pool_id, member, *amount, now)
            }
            Op::CloseBidding { pool, caller } => {
                let pool_id = self.resolve(pool)?;
                self.engine.close_bidding(&pool_id, caller, now)
            }
            Op::AdvanceCycle {
                pool,
                caller,
                cycle,
            } => {
                let pool_id = self.resolve(pool)?;
                let cycle = self.cycle(&pool_id, *cycle)?;
                self.engine
                    .advance_cycle(&self.registry, &pool_id, caller, cycle, now)
            }
            Op::ForceAdvanceCycle {
                pool,
                caller,
                cycle,
            } => {
                let pool_id = self.resolve(pool)?;
                let cycle = self.cycle(&pool_id, *cycle)?;
                self.engine
                    .force_advance_cycle(&self.registry, &pool_id, caller, cycle, now)
            }
            Op::ProcessPayout {
                pool,
                member,
                cycle,
            } => {
                let pool_id = self.resolve(pool)?;
                let cycle = self.cycle(&pool_id, *cycle)?;
                self.engine
                    .process_payout(&self.registry, &pool_id, member, cycle, now)
            }
            Op::RequestEarlyPayout {
                pool,
                member,
                cycle,
            } => {
                let pool_id = self.resolve(pool)?;
                let cycle = self.cycle(&pool_id, *cycle)?;
                self.engine
                    .request_early_payout(&self.registry, &pool_id, member, cycle, now)
            }
            Op::DepositCollateral {
                pool,
                member,
                amount,
            } => {
                let pool_id = self.resolve(pool)?;
                self.engine.deposit_collateral(&pool_id, member, *amount, now)
            }
            Op::WithdrawCollateral { pool, member } => {
                let pool_id = self.resolve(pool)?;
                self.engine.withdraw_collateral(&pool_id, member, now)
            }
            Op::ClosePool { pool, caller } => {
                let pool_id = self.resolve(pool)?;
                self.engine.close_pool(&pool_id, caller, now)
            }
            Op::UnfreezePool { pool, caller } => {
                let pool_id = self.resolve(pool)?;
                self.engine
                    .unfreeze_pool(&self.registry, caller, &pool_id, now)
            }
            Op::UpdateFee { caller, fee_bps } => {
                self.engine
                    .update_fee(&mut self.registry, caller, *fee_bps, now)
            }
            Op::UpdateTreasury { caller, treasury } => {
                self.engine
                    .update_treasury(&mut self.registry, caller, treasury, now)
            }
            Op::UpdatePenalty {
                caller,
                penalty_bps,
            } => self
                .engine
                .update_penalty(&mut self.registry, caller, *penalty_bps, now),
        };
        Ok(outcome)
    }
}

/// Replay every step; unexpected outcomes abort unless `keep_going`
pub fn replay(scenario: Scenario, keep_going: bool) -> Result<Replay> {
    let mut engine = SettlementEngine::new();
    let setup = &scenario.registry;
    let registry = engine
        .initialize_registry(&setup.admin, &setup.treasury, setup.fee_bps, 0)
        .context("initializing registry")?;
    for (owner, amount) in &scenario.wallets {
        engine
            .fund_wallet(owner, *amount)
            .with_context(|| format!("funding wallet {}", owner))?;
    }

    let mut runner = Runner {
        engine,
        registry,
        aliases: BTreeMap::new(),
    };
    let mut rejected = 0;

    for (index, step) in scenario.steps.iter().enumerate() {
        let outcome = runner
            .apply(&step.op, step.at)
            .with_context(|| format!("step {} ({})", index, step.op.name()))?;
        match (outcome, step.expect_error) {
            (Ok(()), false) => info!(step = index, op = step.op.name(), at = step.at, "ok"),
            (Err(err), true) => {
                rejected += 1;
                info!(step = index, op = step.op.name(), error = %err, "rejected as expected");
            }
            (Ok(()), true) => {
                let msg = format!("step {} ({}) succeeded but was expected to fail", index, step.op.name());
                if !keep_going {
                    return Err(anyhow!(msg));
                }
                warn!("{}", msg);
            }
            (Err(err), false) => {
                rejected += 1;
                if !keep_going {
                    return Err(anyhow::Error::new(err).context(format!(
                        "step {} ({}) at {}",
                        index,
                        step.op.name(),
                        step.at
                    )));
                }
                warn!(step = index, op = step.op.name(), error = %err, "step rejected");
            }
        }
    }

    Ok(Replay {
        engine: runner.engine,
        registry: runner.registry,
        aliases: runner.aliases,
        rejected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"{
        "registry": {"admin": "admin", "treasury": "treasury", "fee_bps": 100},
        "wallets": {"alice": 1000, "bob": 1000, "carol": 1000},
        "steps": [
            {"at": 0, "op": "create_pool", "creator": "alice", "alias": "circle"},
            {"at": 1, "op": "join_pool", "pool": "circle", "member": "bob"},
            {"at": 2, "op": "join_pool", "pool": "circle", "member": "carol"},
            {"at": 3, "op": "join_pool", "pool": "circle", "member": "dave", "expect_error": true},
            {"at": 10, "op": "contribute", "pool": "circle", "member": "alice"},
            {"at": 11, "op": "contribute", "pool": "circle", "member": "bob"},
            {"at": 12, "op": "contribute", "pool": "circle", "member": "carol"},
            {"at": 13, "op": "force_advance_cycle", "pool": "circle", "caller": "alice"}
        ]
    }"#;

    #[test]
    fn test_replay_scenario() {
        let scenario: Scenario = serde_json::from_str(SCENARIO).unwrap();
        let replay = replay(scenario, false).unwrap();
        assert_eq!(replay.rejected, 1);
        assert_eq!(replay.engine.wallet_balance("alice"), 1197);
        assert_eq!(replay.engine.wallet_balance("treasury"), 3);

        let pool_id = replay.aliases["circle"];
        assert_eq!(replay.engine.pool(&pool_id).unwrap().current_cycle(), 1);
    }

    #[test]
    fn test_unexpected_failure_aborts() {
        let scenario: Scenario = serde_json::from_str(
            r#"{
                "registry": {"admin": "admin", "treasury": "treasury"},
                "steps": [
                    {"at": 0, "op": "create_pool", "creator": "alice", "alias": "p"},
                    {"at": 1, "op": "contribute", "pool": "p", "member": "alice"}
                ]
            }"#,
        )
        .unwrap();
        assert!(replay(scenario, false).is_err());
    }
}
