//! TXO ledger command line tool

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use txo_ledger::{Amount, Config, Keeper, RocksStore};

#[derive(Parser)]
#[command(name = "txo-ledger", about = "Chain-of-custody token ledger")]
struct Cli {
    /// Path to a TOML configuration file. Environment variables are used
    /// when absent.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data directory, overrides the configuration.
    #[arg(long, env = "TXO_LEDGER_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create tokens for an owner with no source.
    Mint {
        owner: String,
        token: String,
        amount: Amount,
        /// TXO id, a fresh UUIDv7 when omitted.
        #[arg(long)]
        id: Option<String>,
        /// Creation time in nanoseconds, now when omitted.
        #[arg(long)]
        timestamp: Option<i64>,
    },

    /// Move tokens between owners.
    Transfer {
        src: String,
        dst: String,
        token: String,
        amount: Amount,
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        timestamp: Option<i64>,
    },

    /// Print the unspent balance of a wallet.
    Balance { owner: String, token: String },

    /// Print a stored TXO.
    ShowTxo { id: String },

    /// Print a stored wallet.
    ShowWallet { owner: String, token: String },

    /// Print every TXO a TXO was funded from, root first.
    Provenance { id: String },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::from_env()?,
    };
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    let keeper = Keeper::open(&config).context("opening ledger")?;
    let result = run(&keeper, cli.command);
    keeper.close()?;
    result
}

fn run(keeper: &Keeper<RocksStore>, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Mint {
            owner,
            token,
            amount,
            id,
            timestamp,
        } => {
            let id = id.unwrap_or_else(new_id);
            keeper.mint(&owner, &token, amount, timestamp.unwrap_or_else(now_nanos), &id)?;
            println!("{}", id);
        }
        Command::Transfer {
            src,
            dst,
            token,
            amount,
            id,
            timestamp,
        } => {
            let id = id.unwrap_or_else(new_id);
            keeper.transfer(
                &src,
                &dst,
                &token,
                amount,
                timestamp.unwrap_or_else(now_nanos),
                &id,
            )?;
            println!("{}", id);
        }
        Command::Balance { owner, token } => {
            println!("{}", keeper.balance(&owner, &token)?);
        }
        Command::ShowTxo { id } => {
            let bytes = keeper
                .store()
                .load_txo_json(&id)?
                .with_context(|| format!("TXO {} not found", id))?;
            println!("{}", String::from_utf8_lossy(&bytes));
        }
        Command::ShowWallet { owner, token } => {
            let bytes = keeper
                .store()
                .load_wallet_json(&owner, &token)?
                .with_context(|| format!("wallet {}:{} not found", owner, token))?;
            println!("{}", String::from_utf8_lossy(&bytes));
        }
        Command::Provenance { id } => {
            let history = keeper.provenance(&id)?;
            println!("{}", serde_json::to_string_pretty(&history)?);
        }
    }
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // Logs go to stderr so command output stays parseable
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0)
}
