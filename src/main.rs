use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::Rng;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use leader_finder::config::{FinderConfig, DEFAULT_ELECTION_PATH};
use leader_finder::coordination::{DisabledConnector, MemoryEnsemble};
use leader_finder::election::{leader_node_path, DEFAULT_MEMBER_PREFIX};
use leader_finder::finder::Finder;
use leader_finder::metrics;

#[derive(Parser)]
#[command(
    name = "leader-finder",
    version,
    about = "Resolve the current leader of a replicated service",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the leader URL for an address
    Resolve {
        /// Discovery address (http://host:port or zk://host:port,...)
        address: Option<String>,

        /// Election directory for zk:// addresses
        #[arg(short, long)]
        election_path: Option<String>,

        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Run a watcher against an in-memory ensemble and kill members at random
    Simulate {
        /// Number of election members
        #[arg(short, long, default_value = "3")]
        members: usize,

        /// Number of kill rounds
        #[arg(short, long, default_value = "5")]
        rounds: usize,

        /// Print Prometheus metrics when done
        #[arg(long, default_value = "false")]
        metrics: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging
    setup_tracing(&cli.log_format, cli.verbose)?;

    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "metrics unavailable");
    }

    match cli.command {
        Commands::Resolve {
            address,
            election_path,
            config,
        } => {
            tracing::debug!(
                address = ?address,
                election_path = ?election_path,
                config = ?config,
                "Starting resolve command"
            );
            resolve(address, election_path, config).await?;
        }

        Commands::Simulate {
            members,
            rounds,
            metrics,
        } => {
            tracing::info!(members = %members, rounds = %rounds, "Starting simulate command");
            simulate(members, rounds, metrics).await?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("leader_finder=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new("leader_finder=info,warn")
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

async fn resolve(
    address: Option<String>,
    election_path: Option<String>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => FinderConfig::from_file(&path)?,
        None => FinderConfig::default(),
    };
    if let Some(address) = address {
        config.address = address;
    }
    if election_path.is_some() {
        config.election_path = election_path;
    }
    if config.address.is_empty() {
        anyhow::bail!("no address given; pass one or set it in --config");
    }

    // No coordination client ships with the binary, so zk:// addresses fail
    // to connect here.
    let finder = Finder::resolve(&config, &DisabledConnector)
        .await
        .with_context(|| format!("cannot resolve leader for {}", config.address))?;

    let url = finder.leader_url().await?;
    println!("{url}");

    finder.shutdown().await?;
    Ok(())
}

async fn simulate(members: usize, rounds: usize, print_metrics: bool) -> Result<()> {
    if members == 0 {
        anyhow::bail!("--members must be at least 1");
    }

    let ensemble = MemoryEnsemble::new();
    ensemble.create_path(DEFAULT_ELECTION_PATH);

    let mut next_host = 0usize;
    let mut join = |ensemble: &MemoryEnsemble| -> Result<String> {
        next_host += 1;
        let payload = serde_json::json!({
            "serviceEndpoint": {"host": format!("10.0.0.{next_host}"), "port": 8081},
            "status": "ALIVE",
        });
        let node = ensemble.create_sequential(
            DEFAULT_ELECTION_PATH,
            DEFAULT_MEMBER_PREFIX,
            payload.to_string(),
        )?;
        println!("  joined   {node} (10.0.0.{next_host}:8081)");
        Ok(node)
    };

    println!("Starting {members} members under {DEFAULT_ELECTION_PATH}");
    for _ in 0..members {
        join(&ensemble)?;
    }

    let config = FinderConfig::builder()
        .address("zk://memory:2181")
        .poll_interval(Duration::from_millis(100))
        .build()?;
    let finder = Finder::resolve(&config, &ensemble).await?;
    let mut changes = finder
        .subscribe()
        .context("watch-mode finder has no change stream")?;

    tokio::time::timeout(Duration::from_secs(5), changes.wait_for(Option::is_some))
        .await
        .context("no leader elected within 5s")??;
    println!("Leader: {}", finder.leader_url().await?);

    for round in 1..=rounds {
        let children = ensemble.children_of(DEFAULT_ELECTION_PATH);
        let leader = leader_node_path(DEFAULT_ELECTION_PATH, &children, DEFAULT_MEMBER_PREFIX)?;
        let leader_name = leader.rsplit('/').next().unwrap_or_default();
        let followers: Vec<&String> = children
            .iter()
            .filter(|child| child.as_str() != leader_name)
            .collect();

        let kill_leader = followers.is_empty() || rand::thread_rng().gen_bool(0.5);
        let victim = if kill_leader {
            leader.clone()
        } else {
            let pick = rand::thread_rng().gen_range(0..followers.len());
            format!("{DEFAULT_ELECTION_PATH}/{}", followers[pick])
        };

        println!("Round {round}: killing {} {victim}", if kill_leader { "leader" } else { "follower" });
        changes.borrow_and_update();
        ensemble.delete(&victim)?;
        join(&ensemble)?;

        if kill_leader {
            tokio::time::timeout(Duration::from_secs(5), changes.changed())
                .await
                .context("leader change not observed within 5s")??;
        }
        println!("  leader   {}", finder.leader_url().await?);
    }

    finder.shutdown().await?;

    if print_metrics {
        print!("{}", metrics::encode_metrics().map_err(|e| anyhow::anyhow!("{e}"))?);
    }

    Ok(())
}
