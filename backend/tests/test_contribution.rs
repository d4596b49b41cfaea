//! Contribution Tests
//!
//! Exact-amount contributions, one per member per cycle, wallet funding,
//! and the transition to payout readiness.

use rosca_core_rs::{
    CyclePhase, EngineError, NewPool, PoolConfig, PoolId, ProtocolRegistry, SettlementEngine,
    WalletError,
};

// ============================================================================
// Test Helpers
// ============================================================================

/// Active three-seat pool (alice, bob, carol), contribution 100, activated at t=2
fn active_pool(config: PoolConfig) -> (SettlementEngine, ProtocolRegistry, PoolId) {
    let mut engine = SettlementEngine::new();
    let registry = engine
        .initialize_registry("admin", "treasury", 100, 0)
        .unwrap();
    for owner in ["alice", "bob", "carol"] {
        engine.fund_wallet(owner, 1_000).unwrap();
    }
    let pool_id = engine
        .create_pool(&registry, "alice", NewPool::with_config(config), 0)
        .unwrap();
    engine.join_pool(&pool_id, "bob", 1).unwrap();
    engine.join_pool(&pool_id, "carol", 2).unwrap();
    (engine, registry, pool_id)
}

// ============================================================================
// Happy path
// ============================================================================

#[test]
fn test_contribution_moves_funds_into_vault() {
    let (mut engine, _, pool_id) = active_pool(PoolConfig::default());

    engine.contribute(&pool_id, "bob", 100, 10).unwrap();

    assert_eq!(engine.wallet_balance("bob"), 900);
    assert_eq!(engine.vault(&pool_id).unwrap().contribution_balance(), 100);
    assert_eq!(engine.pool(&pool_id).unwrap().total_contributions(), 100);

    let bob = engine.member(&pool_id, "bob").unwrap();
    assert!(bob.has_contributed_this_cycle());
    assert_eq!(bob.contributions_made(), 1);
    assert_eq!(bob.total_contributed(), 100);
    assert_eq!(bob.last_contribution_timestamp(), Some(10));

    assert_eq!(engine.event_log().events_of_type("Contribution").len(), 1);
    assert_eq!(engine.event_log().events_for_member("bob").len(), 2);
}

#[test]
fn test_last_contribution_makes_pot_ready() {
    let (mut engine, _, pool_id) = active_pool(PoolConfig::default());

    engine.contribute(&pool_id, "alice", 100, 10).unwrap();
    engine.contribute(&pool_id, "bob", 100, 11).unwrap();
    assert_eq!(
        engine.pool(&pool_id).unwrap().phase(),
        Some(CyclePhase::Contributing)
    );

    engine.contribute(&pool_id, "carol", 100, 12).unwrap();
    let pool = engine.pool(&pool_id).unwrap();
    assert_eq!(pool.phase(), Some(CyclePhase::ReadyForPayout));
    assert_eq!(pool.window().unwrap().ready_at(), Some(12));
    assert_eq!(pool.total_contributions(), 300);

    let summary = engine.summary(&pool_id).unwrap();
    assert_eq!(summary.contributed_this_cycle, 3);
    assert_eq!(summary.vault_balance, 300);
    assert_eq!(summary.current_recipient.as_deref(), Some("alice"));
}

// ============================================================================
// Rejections
// ============================================================================

#[test]
fn test_second_contribution_same_cycle_rejected() {
    let (mut engine, _, pool_id) = active_pool(PoolConfig::default());
    engine.contribute(&pool_id, "bob", 100, 10).unwrap();

    let err = engine.contribute(&pool_id, "bob", 100, 11).unwrap_err();
    assert_eq!(err, EngineError::AlreadyContributed("bob".to_string()));
    assert_eq!(engine.pool(&pool_id).unwrap().total_contributions(), 100);
    assert_eq!(engine.wallet_balance("bob"), 900);
    assert_eq!(engine.member(&pool_id, "bob").unwrap().contributions_made(), 1);
}

#[test]
fn test_contribution_must_be_exact() {
    let (mut engine, _, pool_id) = active_pool(PoolConfig::default());

    for amount in [99, 101, 0] {
        let err = engine.contribute(&pool_id, "bob", amount, 10).unwrap_err();
        assert_eq!(
            err,
            EngineError::IncorrectContributionAmount {
                expected: 100,
                actual: amount
            }
        );
    }
    assert_eq!(engine.vault(&pool_id).unwrap().balance(), 0);
}

#[test]
fn test_outsider_cannot_contribute() {
    let (mut engine, _, pool_id) = active_pool(PoolConfig::default());
    engine.fund_wallet("mallory", 1_000).unwrap();

    let err = engine.contribute(&pool_id, "mallory", 100, 10).unwrap_err();
    assert_eq!(err, EngineError::NotParticipant("mallory".to_string()));
    assert_eq!(engine.wallet_balance("mallory"), 1_000);
}

#[test]
fn test_contribution_needs_funded_wallet() {
    let mut engine = SettlementEngine::new();
    let registry = engine
        .initialize_registry("admin", "treasury", 100, 0)
        .unwrap();
    engine.fund_wallet("alice", 1_000).unwrap();
    engine.fund_wallet("bob", 50).unwrap();
    let pool_id = engine
        .create_pool(&registry, "alice", NewPool::default(), 0)
        .unwrap();
    engine.join_pool(&pool_id, "bob", 1).unwrap();
    engine.join_pool(&pool_id, "carol", 2).unwrap();

    let err = engine.contribute(&pool_id, "bob", 100, 10).unwrap_err();
    assert_eq!(
        err,
        EngineError::Wallet(WalletError::InsufficientFunds {
            required: 100,
            available: 50
        })
    );
    // carol never funded a wallet at all
    assert!(matches!(
        engine.contribute(&pool_id, "carol", 100, 10).unwrap_err(),
        EngineError::Wallet(_)
    ));
    assert!(!engine.member(&pool_id, "bob").unwrap().has_contributed_this_cycle());
    assert_eq!(engine.vault(&pool_id).unwrap().balance(), 0);
}

#[test]
fn test_contribution_before_activation_rejected() {
    let mut engine = SettlementEngine::new();
    let registry = engine
        .initialize_registry("admin", "treasury", 100, 0)
        .unwrap();
    engine.fund_wallet("alice", 1_000).unwrap();
    let pool_id = engine
        .create_pool(&registry, "alice", NewPool::default(), 0)
        .unwrap();

    assert_eq!(
        engine.contribute(&pool_id, "alice", 100, 1).unwrap_err(),
        EngineError::PoolNotActive
    );
}

#[test]
fn test_contribution_flags_reset_next_cycle() {
    let (mut engine, registry, pool_id) = active_pool(PoolConfig::default());
    for member in ["alice", "bob", "carol"] {
        engine.contribute(&pool_id, member, 100, 10).unwrap();
    }
    engine
        .force_advance_cycle(&registry, &pool_id, "alice", 0, 20)
        .unwrap();

    let bob = engine.member(&pool_id, "bob").unwrap();
    assert!(!bob.has_contributed_this_cycle());
    assert_eq!(bob.contributions_made(), 1);

    engine.contribute(&pool_id, "bob", 100, 30).unwrap();
    assert_eq!(engine.member(&pool_id, "bob").unwrap().contributions_made(), 2);
}
