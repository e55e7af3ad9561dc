use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use wager_ledger::{
    config::Config, db::init_db, Decimal, GameType, IdentityProvider, Repository,
    SettlementCoordinator, StakeLimits, TrustedIdentityProvider, UserId, Wager, WagerResponse,
};

/// Wager settlement engine over an append-only SQLite ledger
#[derive(Parser)]
#[command(name = "wager-ledger")]
#[command(about = "Settle wagers against an append-only ledger")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// SQLite database path (overrides DATABASE_PATH)
    #[arg(short, long)]
    database: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Credit external funds to a user
    Deposit {
        user: String,
        amount: Decimal,
        #[arg(long, default_value = "deposit")]
        description: String,
    },

    /// Debit funds from a user
    Withdraw {
        user: String,
        amount: Decimal,
        #[arg(long, default_value = "withdraw")]
        description: String,
    },

    /// Credit promotional funds to a user
    Bonus {
        user: String,
        amount: Decimal,
        #[arg(long, default_value = "bonus")]
        description: String,
    },

    /// Place and settle one wager
    Wager {
        user: String,
        stake: Decimal,
        /// Game to play (defaults to DEFAULT_GAME)
        #[arg(short, long)]
        game: Option<String>,
    },

    /// Show the ledger balance next to the cached balance
    Balance { user: String },

    /// Show per-game statistics
    Stats { user: String },

    /// List ledger entries in replay order
    Ledger { user: String },

    /// List settled bets, newest first
    Bets {
        user: String,
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Show or set the stake limits of a game
    Limits {
        game: String,
        #[arg(long, requires = "max")]
        min: Option<Decimal>,
        #[arg(long, requires = "min")]
        max: Option<Decimal>,
    },

    /// Rebuild the cached balance from the ledger
    Reconcile { user: String },

    /// Fund several users and settle wagers for all of them concurrently
    Simulate {
        #[arg(short, long, default_value = "4")]
        users: i64,
        #[arg(short, long, default_value = "10")]
        wagers: usize,
        #[arg(short, long, default_value = "10")]
        stake: Decimal,
        #[arg(long, default_value = "100")]
        deposit: Decimal,
    },
}

#[derive(Serialize)]
struct SimulationSummary {
    user_id: UserId,
    committed: usize,
    rejected: usize,
    failed: usize,
    balance: Decimal,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Load configuration
    let mut env_map: HashMap<String, String> = std::env::vars().collect();
    if let Some(path) = cli.database {
        env_map.insert("DATABASE_PATH".to_string(), path);
    }
    let config = Config::from_env_map(env_map).context("Configuration error")?;

    // Initialize database and dependencies
    let pool = init_db(&config.database_path)
        .await
        .context("Failed to initialize database")?;
    let repo = Arc::new(Repository::new(pool));
    let coordinator = Arc::new(SettlementCoordinator::from_config(repo.clone(), &config)?);
    let identity = TrustedIdentityProvider;
    let balances = coordinator.balances();

    let output = match cli.command {
        Commands::Deposit {
            user,
            amount,
            description,
        } => {
            let user_id = identity.resolve(&user).await?;
            let balance = balances.deposit(user_id, amount, &description).await?;
            json!({ "user_id": user_id, "balance": balance })
        }
        Commands::Withdraw {
            user,
            amount,
            description,
        } => {
            let user_id = identity.resolve(&user).await?;
            let balance = balances.withdraw(user_id, amount, &description).await?;
            json!({ "user_id": user_id, "balance": balance })
        }
        Commands::Bonus {
            user,
            amount,
            description,
        } => {
            let user_id = identity.resolve(&user).await?;
            let balance = balances.bonus(user_id, amount, &description).await?;
            json!({ "user_id": user_id, "balance": balance })
        }
        Commands::Wager { user, stake, game } => {
            let user_id = identity.resolve(&user).await?;
            let game_type = game
                .map(GameType::new)
                .unwrap_or_else(|| config.default_game.clone());
            let response = coordinator
                .place_wager_response(&Wager::new(user_id, game_type, stake))
                .await?;
            serde_json::to_value(response)?
        }
        Commands::Balance { user } => {
            let user_id = identity.resolve(&user).await?;
            json!({
                "user_id": user_id,
                "balance": balances.balance(user_id).await?,
                "cached": repo.cached_balance(user_id).await?,
            })
        }
        Commands::Stats { user } => {
            let user_id = identity.resolve(&user).await?;
            serde_json::to_value(repo.query_user_stats(user_id).await?)?
        }
        Commands::Ledger { user } => {
            let user_id = identity.resolve(&user).await?;
            serde_json::to_value(repo.query_ledger(user_id).await?)?
        }
        Commands::Bets { user, limit } => {
            let user_id = identity.resolve(&user).await?;
            serde_json::to_value(repo.query_bets(user_id, limit).await?)?
        }
        Commands::Limits { game, min, max } => {
            let game_type = GameType::new(game);
            if let (Some(min), Some(max)) = (min, max) {
                let limits = StakeLimits::new(min, max);
                if !limits.is_valid() {
                    bail!("Invalid limits: need 0 < min <= max, got {} and {}", min, max);
                }
                repo.set_bet_limits(&game_type, limits).await?;
            }
            let stored = repo.get_bet_limits(&game_type).await?;
            json!({
                "game_type": game_type,
                "limits": stored.unwrap_or(config.stake_limits),
                "overridden": stored.is_some(),
            })
        }
        Commands::Reconcile { user } => {
            let user_id = identity.resolve(&user).await?;
            serde_json::to_value(balances.reconcile(user_id).await?)?
        }
        Commands::Simulate {
            users,
            wagers,
            stake,
            deposit,
        } => {
            let user_ids: Vec<UserId> = (1..=users).map(UserId::new).collect();
            for user_id in &user_ids {
                balances.deposit(*user_id, deposit, "simulation").await?;
            }

            let mut tasks = Vec::with_capacity(user_ids.len() * wagers);
            for user_id in &user_ids {
                for _ in 0..wagers {
                    let coordinator = coordinator.clone();
                    let wager = Wager::new(*user_id, config.default_game.clone(), stake);
                    tasks.push(tokio::spawn(async move {
                        let result = coordinator.place_wager(&wager).await;
                        (wager.user_id, WagerResponse::from_result(result))
                    }));
                }
            }
            let results = join_all(tasks).await;

            let mut summaries: HashMap<UserId, SimulationSummary> = HashMap::new();
            for user_id in &user_ids {
                summaries.insert(
                    *user_id,
                    SimulationSummary {
                        user_id: *user_id,
                        committed: 0,
                        rejected: 0,
                        failed: 0,
                        balance: Decimal::zero(),
                    },
                );
            }
            for joined in results {
                let (user_id, response) = joined.context("Wager task panicked")?;
                if let Some(summary) = summaries.get_mut(&user_id) {
                    match response {
                        Ok(r) if r.reason.is_none() => summary.committed += 1,
                        Ok(_) => summary.rejected += 1,
                        Err(_) => summary.failed += 1,
                    }
                }
            }

            let mut ordered = Vec::with_capacity(user_ids.len());
            for user_id in &user_ids {
                if let Some(mut summary) = summaries.remove(user_id) {
                    summary.balance = balances.balance(*user_id).await?;
                    ordered.push(summary);
                }
            }
            serde_json::to_value(ordered)?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
