use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;
use wager_ledger::config::Config;
use wager_ledger::db::init_db;
use wager_ledger::{
    Decimal, EntryKind, GameType, IdentityProvider, MockIdentityProvider, RejectReason,
    Repository, SettlementCoordinator, SettlementError, StakeLimits, Tier, UserId, Wager, WagerStatus,
};

/// Cascade with every win path switched off: each wager loses its stake.
const ALWAYS_LOSE: &[(&str, &str)] = &[
    ("ONBOARDING_TIERS", ""),
    ("RESCUE_AFTER_LOSSES", "0"),
    ("SUPPRESSED_WIN_PERCENT", "0"),
    ("NORMAL_WIN_PERCENT", "0"),
];

async fn setup(overrides: &[(&str, &str)]) -> (Arc<SettlementCoordinator>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();

    let mut env_map = HashMap::new();
    env_map.insert("DATABASE_PATH".to_string(), db_path);
    env_map.insert("RNG_SEED".to_string(), "7".to_string());
    for (key, value) in overrides {
        env_map.insert(key.to_string(), value.to_string());
    }
    let config = Config::from_env_map(env_map).expect("config failed");

    let pool = init_db(&config.database_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));
    let coordinator = SettlementCoordinator::from_config(repo, &config).expect("coordinator failed");
    (Arc::new(coordinator), temp_dir)
}

fn d(s: &str) -> Decimal {
    Decimal::from_str_canonical(s).unwrap()
}

fn roleta(user: i64, stake: &str) -> Wager {
    Wager::new(UserId::new(user), GameType::new("roleta"), d(stake))
}

/// Ledger sum, cached balance and replayed prefix sums must all agree, and
/// no prefix of the replay may go negative.
async fn assert_ledger_consistent(coordinator: &SettlementCoordinator, user: UserId) -> Decimal {
    let repo = coordinator.repo();
    let entries = repo.query_ledger(user).await.unwrap();

    let mut running = Decimal::zero();
    for entry in &entries {
        running += entry.amount;
        assert!(
            !running.is_negative(),
            "balance went negative after entry {}",
            entry.id
        );
    }

    assert_eq!(repo.ledger_balance(user).await.unwrap(), running);
    assert_eq!(repo.cached_balance(user).await.unwrap(), Some(running));
    running
}

#[tokio::test]
async fn test_onboarding_is_deterministic_across_seeds() {
    for seed in ["1", "2", "3", "99"] {
        let (coordinator, _temp) = setup(&[("RNG_SEED", seed)]).await;
        let user = UserId::new(1);
        coordinator.balances().deposit(user, d("1000"), "seed").await.unwrap();

        let mut profits = Vec::new();
        for _ in 0..3 {
            let receipt = coordinator.place_wager(&roleta(1, "100")).await.unwrap();
            assert!(receipt.outcome.is_win);
            profits.push(receipt.profit);
        }

        assert_eq!(profits, vec![d("5"), d("10"), d("10")], "seed {}", seed);
        assert_eq!(assert_ledger_consistent(&coordinator, user).await, d("1025"));
    }
}

#[tokio::test]
async fn test_onboarding_counts_bets_across_games() {
    let (coordinator, _temp) = setup(&[]).await;
    let user = UserId::new(2);
    coordinator.balances().deposit(user, d("500"), "seed").await.unwrap();

    let first = coordinator.place_wager(&roleta(2, "10")).await.unwrap();
    let second = coordinator
        .place_wager(&Wager::new(user, GameType::new("dados"), d("10")))
        .await
        .unwrap();

    assert_eq!(first.outcome.tier, Tier::Cinco);
    assert_eq!(second.outcome.tier, Tier::Dez);

    let stats = coordinator.repo().query_user_stats(user).await.unwrap();
    assert_eq!(stats.len(), 2);
    assert!(stats.iter().all(|s| s.total_bets == 1));
}

#[tokio::test]
async fn test_loss_streak_rescue_resets_counter() {
    let (coordinator, _temp) = setup(&[
        ("ONBOARDING_TIERS", ""),
        ("RESCUE_AFTER_LOSSES", "3"),
        ("SUPPRESSED_WIN_PERCENT", "0"),
        ("NORMAL_WIN_PERCENT", "0"),
    ])
    .await;
    let user = UserId::new(3);
    let game = GameType::new("roleta");
    coordinator.balances().deposit(user, d("100"), "seed").await.unwrap();

    let mut tiers = Vec::new();
    for _ in 0..8 {
        let receipt = coordinator.place_wager(&roleta(3, "10")).await.unwrap();
        tiers.push(receipt.outcome.tier);
    }

    use Tier::{Miseria, Perca};
    assert_eq!(
        tiers,
        vec![Perca, Perca, Perca, Miseria, Perca, Perca, Perca, Miseria]
    );

    let stats = coordinator
        .repo()
        .get_user_stats(user, &game)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stats.consecutive_losses, 0);
    assert_eq!(stats.current_streak, 1);
    assert_eq!(stats.worst_loss_streak, 3);
    assert_eq!(stats.total_wins, 2);
    assert_eq!(stats.biggest_win, d("0.05"));
    assert_eq!(assert_ledger_consistent(&coordinator, user).await, d("40.1"));
}

#[tokio::test]
async fn test_scenario_high_balance_bets() {
    let (coordinator, _temp) = setup(&[("ONBOARDING_TIERS", ""), ("RESCUE_AFTER_LOSSES", "0")]).await;
    let user = UserId::new(4);
    coordinator.balances().deposit(user, d("1000"), "seed").await.unwrap();

    let mut expected = d("1000");
    for _ in 0..5 {
        let before = coordinator.balances().balance(user).await.unwrap();
        let receipt = coordinator.place_wager(&roleta(4, "100")).await.unwrap();

        if before >= d("1000") {
            match receipt.outcome.tier {
                Tier::Perca => assert_eq!(receipt.profit, d("-100")),
                Tier::Miseria => assert_eq!(receipt.profit, d("0.5")),
                other => panic!("high balance produced tier {}", other),
            }
        }
        assert_eq!(receipt.new_balance, before + receipt.profit);
        expected += receipt.profit;
    }

    assert_eq!(assert_ledger_consistent(&coordinator, user).await, expected);
    let stats = coordinator
        .repo()
        .get_user_stats(user, &GameType::new("roleta"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stats.total_bets, 5);
    assert_eq!(stats.total_amount_bet, d("500"));
    assert_eq!(stats.total_profit, expected - d("1000"));
}

#[tokio::test]
async fn test_high_balance_wins_are_rare_and_minimal() {
    let (coordinator, _temp) = setup(&[("ONBOARDING_TIERS", ""), ("RESCUE_AFTER_LOSSES", "0")]).await;
    let user = UserId::new(5);
    coordinator.balances().deposit(user, d("100000"), "seed").await.unwrap();

    let mut wins = 0;
    for _ in 0..300 {
        let receipt = coordinator.place_wager(&roleta(5, "1")).await.unwrap();
        if receipt.outcome.is_win {
            assert_eq!(receipt.outcome.tier, Tier::Miseria);
            wins += 1;
        }
    }

    // 2% of 300 is 6.
    assert!(wins <= 20, "too many suppressed wins: {}", wins);
    assert_ledger_consistent(&coordinator, user).await;
}

#[tokio::test]
async fn test_rejections_leave_no_trace() {
    let (coordinator, _temp) = setup(&[("MIN_STAKE", "5"), ("MAX_STAKE", "500")]).await;
    let user = UserId::new(6);
    coordinator.balances().deposit(user, d("100"), "seed").await.unwrap();

    for (stake, reason) in [
        ("0", RejectReason::InvalidStake),
        ("-1", RejectReason::InvalidStake),
        ("4.99", RejectReason::OutOfBounds),
        ("500.01", RejectReason::OutOfBounds),
        ("100.01", RejectReason::InsufficientFunds),
    ] {
        let response = coordinator
            .place_wager_response(&roleta(6, stake))
            .await
            .unwrap();
        assert_eq!(response.status, WagerStatus::Rejected);
        assert_eq!(response.reason, Some(reason), "stake {}", stake);
        assert!(response.tier.is_none());
    }

    let repo = coordinator.repo();
    let entries = repo.query_ledger(user).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, EntryKind::Deposit);
    assert!(repo.query_user_stats(user).await.unwrap().is_empty());
    assert!(repo.query_bets(user, 10).await.unwrap().is_empty());

    // The full balance is a valid stake.
    let response = coordinator
        .place_wager_response(&roleta(6, "100"))
        .await
        .unwrap();
    assert_eq!(response.status, WagerStatus::Committed);
}

#[tokio::test]
async fn test_failure_after_ledger_writes_rolls_back_everything() {
    let (coordinator, _temp) = setup(ALWAYS_LOSE).await;
    let user = UserId::new(12);
    coordinator.balances().deposit(user, d("100"), "seed").await.unwrap();
    let repo = coordinator.repo();

    // The bet record is the last write of a settlement, after the ledger
    // entries, the cache refresh and the stats upsert.
    sqlx::query(
        "CREATE TRIGGER fail_bet_records BEFORE INSERT ON bet_records
         BEGIN SELECT RAISE(ABORT, 'bet record refused'); END",
    )
    .execute(repo.pool())
    .await
    .unwrap();

    let err = coordinator.place_wager(&roleta(12, "40")).await.unwrap_err();
    assert!(matches!(err, SettlementError::Persistence(_)), "got {:?}", err);
    assert_eq!(err.reject_reason(), None);

    let entries = repo.query_ledger(user).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, EntryKind::Deposit);
    assert_eq!(repo.cached_balance(user).await.unwrap(), Some(d("100")));
    assert!(repo.query_user_stats(user).await.unwrap().is_empty());
    assert!(repo.query_bets(user, 10).await.unwrap().is_empty());

    sqlx::query("DROP TRIGGER fail_bet_records")
        .execute(repo.pool())
        .await
        .unwrap();

    let receipt = coordinator.place_wager(&roleta(12, "40")).await.unwrap();
    assert_eq!(receipt.new_balance, d("60"));
    assert_eq!(repo.lifetime_bets(user).await.unwrap(), 1);
    assert_eq!(repo.query_bets(user, 10).await.unwrap().len(), 1);
    assert_eq!(assert_ledger_consistent(&coordinator, user).await, d("60"));
}

#[tokio::test]
async fn test_per_game_limits_override_defaults() {
    let (coordinator, _temp) = setup(ALWAYS_LOSE).await;
    let user = UserId::new(7);
    let dados = GameType::new("dados");
    coordinator.balances().deposit(user, d("1000"), "seed").await.unwrap();
    coordinator
        .repo()
        .set_bet_limits(&dados, StakeLimits::new(d("5"), d("50")))
        .await
        .unwrap();

    let on_dados = |stake: &str| Wager::new(user, dados.clone(), d(stake));

    for stake in ["2", "60"] {
        let err = coordinator.place_wager(&on_dados(stake)).await.unwrap_err();
        assert_eq!(err.reject_reason(), Some(RejectReason::OutOfBounds));
    }
    coordinator.place_wager(&on_dados("5")).await.unwrap();
    coordinator.place_wager(&on_dados("50")).await.unwrap();

    // Other games keep the configured defaults.
    coordinator.place_wager(&roleta(7, "2")).await.unwrap();
    coordinator.place_wager(&roleta(7, "60")).await.unwrap();

    assert_eq!(assert_ledger_consistent(&coordinator, user).await, d("883"));
}

#[tokio::test]
async fn test_funding_and_wagers_share_one_ledger() {
    let (coordinator, _temp) = setup(&[]).await;
    let user = UserId::new(8);
    let balances = coordinator.balances();

    balances.deposit(user, d("300"), "top up").await.unwrap();
    balances.bonus(user, d("20"), "welcome").await.unwrap();
    let receipt = coordinator.place_wager(&roleta(8, "100")).await.unwrap();
    balances.withdraw(user, d("50"), "cash out").await.unwrap();

    let err = balances.withdraw(user, d("10000"), "too much").await.unwrap_err();
    assert_eq!(err.reject_reason(), Some(RejectReason::InsufficientFunds));

    let expected = d("270") + receipt.profit;
    assert_eq!(assert_ledger_consistent(&coordinator, user).await, expected);

    let kinds: Vec<EntryKind> = coordinator
        .repo()
        .query_ledger(user)
        .await
        .unwrap()
        .iter()
        .map(|e| e.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            EntryKind::Deposit,
            EntryKind::Bonus,
            EntryKind::Bet,
            EntryKind::Win,
            EntryKind::Withdraw,
        ]
    );

    let report = balances.reconcile(user).await.unwrap();
    assert!(!report.repaired);
    assert_eq!(report.ledger, expected);
}

#[tokio::test]
async fn test_wager_through_identity_provider() {
    let (coordinator, _temp) = setup(&[]).await;
    let identity = MockIdentityProvider::new().with_token("session-abc", UserId::new(9));

    let user = identity.resolve("session-abc").await.unwrap();
    coordinator.balances().deposit(user, d("100"), "seed").await.unwrap();

    let response = coordinator
        .place_wager_response(&Wager::new(user, GameType::new("roleta"), d("40")))
        .await
        .unwrap();
    assert_eq!(response.status, WagerStatus::Committed);
    assert_eq!(response.tier, Some(Tier::Cinco));
    assert_eq!(response.payout, Some(d("42")));
    assert_eq!(response.new_balance, Some(d("102")));

    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["status"], "committed");
    assert!(json.get("reason").is_none());

    assert!(identity.resolve("session-xyz").await.is_err());
}
