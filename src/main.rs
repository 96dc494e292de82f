//! Daily transaction runner
//!
//! Submits a fixed, ordered list of token operations from one wallet, checking
//! token policy, balances and fee budget before every submission, and leaves a
//! JSON report for every run.

use anyhow::Result;
use clap::{Parser, Subcommand};
use ethers::types::U256;
use ethers::utils::to_checksum;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

mod chain;
mod config;
mod error;
mod orchestrator;
mod report;
#[cfg(test)]
mod testing;
mod tx;
mod wallet;

use chain::{EthersLedger, EthersTokenContracts, TxSigner, WalletSigner};
use config::Settings;
use orchestrator::{daily_plan, RunOrchestrator, RunOutcome};
use report::{FileReportWriter, RunClock};

/// Command-line arguments for the runner.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "DAILY_RUNNER_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// Execute the daily operation list
    Run,
    /// Print the address of the configured keystore
    Address {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Encrypt a private key into the configured keystore path
    Encrypt {
        /// Hex private key to encrypt
        #[arg(long, env = "PRIVATE_KEY", hide_env_values = true)]
        private_key: String,
        /// Write the keystore here instead of `wallet.keystore_path`
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List the addresses in a keystore file without decrypting it
    ListAddresses {
        /// Keystore file, defaults to `wallet.keystore_path`
        #[arg(long)]
        keystore: Option<PathBuf>,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    init_logging(args.log_json);

    info!("Starting daily-tx-runner v{}", env!("CARGO_PKG_VERSION"));

    // Config errors exit here, before any report exists
    let settings = Settings::load(args.config.as_deref())?;
    info!(
        "Loaded configuration for chainId={} with {} tokens",
        settings.chain.chain_id,
        settings.tokens.len()
    );

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(&settings).await,
        Command::Address { json } => show_address(&settings, json),
        Command::Encrypt { private_key, out } => encrypt(&settings, &private_key, out.as_deref()),
        Command::ListAddresses { keystore, json } => {
            let path = keystore.unwrap_or_else(|| settings.wallet.keystore_path.clone());
            show_addresses(&path, json)
        }
    }
}

async fn run(settings: &Settings) -> Result<ExitCode> {
    settings.validate_run()?;
    let run_settings = settings.run_settings()?;
    let operations = daily_plan(settings.plan_inputs()?);

    let ledger = Arc::new(EthersLedger::new(
        &settings.chain.rpc_url,
        U256::from(settings.chain.priority_fee_wei),
    )?);
    let contracts = Arc::new(EthersTokenContracts::new(
        ledger.provider().clone(),
        settings.policy_registry()?,
    ));
    let writer = Arc::new(FileReportWriter::new(&settings.run.report_dir));

    let orchestrator = RunOrchestrator::new(
        run_settings,
        operations,
        ledger.clone(),
        contracts,
        writer,
        RunClock::now(),
    );

    let outcome = orchestrator
        .run(|| {
            let wallet = wallet::load_wallet(&settings.wallet)?;
            let signer = WalletSigner::new(wallet, ledger.provider().clone(), settings.chain.chain_id);
            Ok(Arc::new(signer) as Arc<dyn TxSigner>)
        })
        .await;

    match outcome {
        RunOutcome::Completed {
            report,
            transactions,
        } => {
            info!(
                "Daily run succeeded: {} transactions, report={}",
                transactions,
                report.display()
            );
            Ok(ExitCode::SUCCESS)
        }
        RunOutcome::Failed {
            step,
            message,
            report,
        } => {
            match report {
                Some(path) => error!(
                    "Daily run failed at {}: {} (report={})",
                    step,
                    message,
                    path.display()
                ),
                None => error!("Daily run failed at {}: {} (no report written)", step, message),
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

fn show_address(settings: &Settings, json: bool) -> Result<ExitCode> {
    use ethers::signers::Signer;

    let wallet = wallet::load_wallet(&settings.wallet)?;
    let address = to_checksum(&wallet.address(), None);
    if json {
        println!("{}", serde_json::json!({ "address": address }));
    } else {
        println!("address={}", address);
    }
    Ok(ExitCode::SUCCESS)
}

fn encrypt(settings: &Settings, private_key: &str, out: Option<&Path>) -> Result<ExitCode> {
    let out = out.unwrap_or(settings.wallet.keystore_path.as_path());
    let password = wallet::resolve_password(&settings.wallet)?;
    let address = wallet::encrypt_private_key(private_key, &password, out)?;
    println!("Encrypted keystore written to {}", out.display());
    println!("Wallet address: {}", to_checksum(&address, None));
    Ok(ExitCode::SUCCESS)
}

fn show_addresses(path: &Path, json: bool) -> Result<ExitCode> {
    let entries = wallet::list_addresses(path)?;
    if json {
        println!("{}", serde_json::to_string(&entries)?);
    } else {
        for entry in &entries {
            println!("{}: {}", entry.index, entry.address);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn init_logging(json: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,daily_tx_runner=debug"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .init();
    }
}
