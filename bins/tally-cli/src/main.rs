//! tally-cli: Command-line access to a wallet held by a remote wallet service.
//!
//! Reads the receive address, confirmed balance, coins and history of one
//! wallet, and submits transfers. Output is JSON on stdout; logs go to stderr.
//!
//! Cached attributes are kept in a file between runs, so `address` returns
//! the same address until `address --fresh` derives a new one.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde_json::{Value, json};
use tally_cache::{FileCache, MemoryCache};
use tally_client::HttpWalletService;
use tally_core::traits::CacheBackend;
use tally_wallet::{TransferOptions, Wallet, WalletConfig};
use tracing::{debug, info, warn};

/// Tally command-line wallet interface.
#[derive(Parser)]
#[command(name = "tally-cli")]
#[command(version, about = "Cached access to a remote wallet.")]
struct Cli {
    /// Config file (default: <config dir>/tally/config.toml when present).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Wallet id at the wallet service.
    #[arg(short, long, global = true, default_value = "primary")]
    wallet: String,

    /// Override the wallet service URL from the config.
    #[arg(long, global = true)]
    service_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the wallet summary reported by the service.
    Info,
    /// Show the current receive address.
    Address(AddressArgs),
    /// Show the confirmed balance in satoshis.
    Balance,
    /// List unspent coins.
    Coins,
    /// List transaction history.
    History,
    /// List unconfirmed transactions.
    Pending,
    /// Send a transaction.
    Send(SendArgs),
}

#[derive(Args)]
struct AddressArgs {
    /// Derive a fresh address instead of reusing the current one.
    #[arg(long)]
    fresh: bool,
}

#[derive(Args)]
struct SendArgs {
    /// Recipient address.
    to: String,

    /// Amount in satoshis.
    #[arg(allow_negative_numbers = true)]
    amount: i64,

    /// Fee rate in satoshis per kilobyte.
    #[arg(long)]
    rate: Option<u64>,

    /// Maximum fee in satoshis.
    #[arg(long)]
    max_fee: Option<u64>,

    /// Add the fee on top of the amount instead of subtracting it.
    #[arg(long)]
    no_subtract_fee: bool,

    /// Extra option passed to the service as-is (repeatable), e.g. `--opt smart=true`.
    #[arg(long = "opt", value_name = "KEY=VALUE")]
    opts: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = WalletConfig::load(resolve_config_path(cli.config)?.as_deref())
        .context("Failed to load configuration")?;
    if let Some(url) = cli.service_url {
        config.service_url = url;
    }

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .init();

    debug!(service = %config.service_url, wallet = %cli.wallet, "starting tally-cli");

    let service = HttpWalletService::new(&config.service_url, config.timeout())
        .context("Failed to build wallet service client")?;
    let cache = open_cache(&config)?;
    let wallet = Wallet::from_config(cli.wallet, &config, Arc::new(service), cache);

    let output = match cli.command {
        Commands::Info => serde_json::to_value(wallet.summary()?)?,
        Commands::Address(args) => wallet_address(&wallet, args)?,
        Commands::Balance => json!({ "confirmed_satoshi": wallet.confirmed_satoshi()? }),
        Commands::Coins => serde_json::to_value(wallet.coins()?)?,
        Commands::History => serde_json::to_value(wallet.transactions()?)?,
        Commands::Pending => serde_json::to_value(wallet.pending_transactions()?)?,
        Commands::Send(args) => wallet_send(&wallet, args)?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Display the current (or a freshly derived) receive address.
fn wallet_address(wallet: &Wallet, args: AddressArgs) -> Result<Value> {
    if args.fresh {
        wallet.forget_address()?;
    }
    let address = wallet.address().context("Failed to derive receive address")?;
    Ok(json!({ "address": address }))
}

/// Submit a transfer and display the service's transaction record.
fn wallet_send(wallet: &Wallet, args: SendArgs) -> Result<Value> {
    let mut options = TransferOptions::new();
    if let Some(rate) = args.rate {
        options = options.rate(rate);
    }
    if let Some(max_fee) = args.max_fee {
        options = options.max_fee(max_fee);
    }
    if args.no_subtract_fee {
        options = options.subtract_fee(false);
    }
    for raw in &args.opts {
        let (key, value) = parse_opt(raw)?;
        options = options.set(key, value);
    }

    let submitted = wallet
        .send(&args.to, args.amount, &options)
        .context("Failed to send transaction")?;
    info!(hash = submitted.hash.as_deref().unwrap_or("?"), "sent");
    Ok(submitted.raw)
}

/// Parse `key=value`; the value is read as JSON when it parses, else as a string.
fn parse_opt(raw: &str) -> Result<(String, Value)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("Invalid option {raw:?} (expected KEY=VALUE)");
    };
    if key.is_empty() {
        bail!("Invalid option {raw:?} (empty key)");
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// The configured cache file, else `<cache dir>/tally/cache.json`. Falls back
/// to an in-memory cache when the platform has no cache directory.
fn open_cache(config: &WalletConfig) -> Result<Arc<dyn CacheBackend>> {
    let path = config
        .cache_file
        .clone()
        .or_else(|| dirs::cache_dir().map(|dir| dir.join("tally").join("cache.json")));
    match path {
        Some(path) => {
            let cache = FileCache::open(&path)
                .with_context(|| format!("Failed to open cache file {}", path.display()))?;
            Ok(Arc::new(cache))
        }
        None => {
            warn!("no cache directory; cached attributes will not outlive this run");
            Ok(Arc::new(MemoryCache::new()))
        }
    }
}

/// Explicit path, else the default config file if it exists.
fn resolve_config_path(path: Option<PathBuf>) -> Result<Option<PathBuf>> {
    if let Some(p) = path {
        if !p.exists() {
            bail!("Config file not found: {}", p.display());
        }
        return Ok(Some(p));
    }
    Ok(dirs::config_dir()
        .map(|dir| dir.join("tally").join("config.toml"))
        .filter(|p| p.exists()))
}
