//! Command-line interface definition.

use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{bail, WrapErr};
use masumi_client::config::{ClientConfig, Network, ServiceEndpoint};
use masumi_client::Amount;
use serde_json::Value;
use std::path::PathBuf;

/// Escrow payment client for the Masumi agent payment service.
#[derive(Parser, Debug)]
#[command(name = "masumi")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Payment service base URL.
    #[arg(long, global = true, env = "MASUMI_PAYMENT_URL")]
    pub payment_url: Option<String>,

    /// Payment service API key.
    #[arg(long, global = true, env = "MASUMI_PAYMENT_KEY", hide_env_values = true)]
    pub payment_key: Option<String>,

    /// Registry service base URL.
    #[arg(long, global = true, env = "MASUMI_REGISTRY_URL")]
    pub registry_url: Option<String>,

    /// Registry service API key.
    #[arg(long, global = true, env = "MASUMI_REGISTRY_KEY", hide_env_values = true)]
    pub registry_key: Option<String>,

    /// Ledger network.
    #[arg(long, global = true, value_enum, env = "MASUMI_NETWORK")]
    pub network: Option<CliNetwork>,

    /// Log level.
    #[arg(long, global = true, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Path to configuration file.
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// What to do.
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compute integrity hashes locally.
    #[command(subcommand)]
    Hash(HashCommand),
    /// Seller-side payment operations.
    #[command(subcommand)]
    Payment(PaymentCommand),
    /// Buyer-side purchase operations.
    #[command(subcommand)]
    Purchase(PurchaseCommand),
    /// Agent registry operations.
    #[command(subcommand)]
    Agent(AgentCommand),
    /// Write the effective configuration to the config file.
    Init,
}

/// `masumi hash ...`
#[derive(Subcommand, Debug)]
pub enum HashCommand {
    /// Salted hash of a job input.
    Input {
        /// Purchaser identifier (26 hex characters).
        #[arg(long)]
        purchaser: String,
        /// JSON payload, or `@path` to read it from a file.
        payload: String,
    },
    /// Hash of a job output.
    Output {
        /// JSON payload, or `@path` to read it from a file.
        payload: String,
    },
}

/// `masumi payment ...`
#[derive(Subcommand, Debug)]
pub enum PaymentCommand {
    /// Register a payment request.
    Create {
        /// Registered seller agent.
        #[arg(long)]
        agent: String,
        /// Purchaser identifier supplied by the buyer.
        #[arg(long)]
        purchaser: String,
        /// Job input as JSON, or `@path`.
        #[arg(long)]
        input: String,
        /// Price component as `AMOUNT[:UNIT]` (unit defaults to lovelace); repeatable.
        #[arg(long = "amount")]
        amounts: Vec<Amount>,
        /// Metadata stored with the escrow.
        #[arg(long)]
        metadata: Option<String>,
    },
    /// Show the current status.
    Status(EscrowArg),
    /// Follow status changes until a terminal status.
    Watch(WatchArgs),
    /// Submit the job output (or its hash).
    SubmitResult {
        #[command(flatten)]
        escrow: EscrowArg,
        /// Job output as JSON, or `@path`.
        #[arg(long, conflicts_with = "hash", required_unless_present = "hash")]
        output: Option<String>,
        /// Precomputed output hash (64 hex characters).
        #[arg(long)]
        hash: Option<String>,
    },
    /// Approve the buyer's refund request.
    AuthorizeRefund(EscrowArg),
}

/// `masumi purchase ...`
#[derive(Subcommand, Debug)]
pub enum PurchaseCommand {
    /// Lock funds against a seller's payment request.
    Create(Box<PurchaseArgs>),
    /// Show the current status.
    Status(EscrowArg),
    /// Follow status changes until a terminal status.
    Watch(WatchArgs),
    /// Ask the seller for a refund.
    RequestRefund(EscrowArg),
    /// Withdraw a pending refund request.
    CancelRefund(EscrowArg),
}

/// `masumi agent ...`
#[derive(Subcommand, Debug)]
pub enum AgentCommand {
    /// Register an agent from a JSON registration file.
    Register {
        /// Registration document.
        file: PathBuf,
    },
    /// List agents registered by a wallet.
    Status {
        /// Wallet verification key; defaults to the payment source's selling wallet.
        #[arg(long)]
        wallet: Option<String>,
    },
    /// Print the selling wallet verification key.
    Wallet,
}

/// An escrow identifier.
#[derive(Args, Debug)]
pub struct EscrowArg {
    /// Blockchain identifier of the escrow.
    pub blockchain_identifier: String,
}

/// Arguments of the `watch` commands.
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Blockchain identifier of the escrow.
    pub blockchain_identifier: String,
    /// Seconds between polls; defaults to the configured interval.
    #[arg(long)]
    pub interval: Option<u64>,
}

/// Arguments of `purchase create`.
#[derive(Args, Debug)]
pub struct PurchaseArgs {
    /// Blockchain identifier of the seller's payment request.
    #[arg(long)]
    pub blockchain_identifier: String,
    /// Seller wallet verification key.
    #[arg(long)]
    pub seller_vkey: String,
    /// Seller agent.
    #[arg(long)]
    pub agent: String,
    /// Purchaser identifier used for the input hash.
    #[arg(long)]
    pub purchaser: String,
    /// Job input as JSON, or `@path`.
    #[arg(long)]
    pub input: String,
    /// Pay-by time (Unix seconds).
    #[arg(long)]
    pub pay_by: i64,
    /// Result submission deadline (Unix seconds).
    #[arg(long)]
    pub submit_result: i64,
    /// Unlock time (Unix seconds).
    #[arg(long)]
    pub unlock: i64,
    /// External dispute unlock time (Unix seconds).
    #[arg(long)]
    pub external_dispute_unlock: i64,
    /// Amount to lock as `AMOUNT[:UNIT]` (unit defaults to lovelace); repeatable.
    #[arg(long = "amount")]
    pub amounts: Vec<Amount>,
    /// Metadata stored with the purchase.
    #[arg(long)]
    pub metadata: Option<String>,
}

/// Network CLI enum.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliNetwork {
    /// Pre-production test network.
    Preprod,
    /// Main network.
    Mainnet,
}

/// Log format CLI enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

impl Cli {
    /// Path of the config file in effect.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(ClientConfig::default_path)
    }

    /// Build the client configuration.
    ///
    /// The config file is read first (if present), then flags and
    /// environment variables override it.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly given config file cannot be loaded,
    /// or the payment endpoint is missing.
    pub fn to_config(&self) -> color_eyre::Result<ClientConfig> {
        let path = self.config_path();
        let from_file = if self.config.is_some() || path.exists() {
            Some(
                ClientConfig::from_file(&path)
                    .wrap_err_with(|| format!("loading {}", path.display()))?,
            )
        } else {
            None
        };

        let mut config = match (from_file, &self.payment_url, &self.payment_key) {
            (Some(config), _, _) => config,
            (None, Some(url), Some(key)) => ClientConfig::new(ServiceEndpoint::new(url, key)),
            (None, _, _) => bail!(
                "no payment endpoint: pass --payment-url and --payment-key or create {}",
                path.display()
            ),
        };

        if let Some(url) = &self.payment_url {
            config.payment.base_url.clone_from(url);
        }
        if let Some(key) = &self.payment_key {
            config.payment.api_key.clone_from(key);
        }
        if let (Some(url), Some(key)) = (&self.registry_url, &self.registry_key) {
            config.registry = Some(ServiceEndpoint::new(url, key));
        } else if let Some(registry) = config.registry.as_mut() {
            if let Some(url) = &self.registry_url {
                registry.base_url.clone_from(url);
            }
            if let Some(key) = &self.registry_key {
                registry.api_key.clone_from(key);
            }
        }
        if let Some(network) = self.network {
            config.network = network.into();
        }

        config.validate()?;
        Ok(config)
    }
}

impl From<CliNetwork> for Network {
    fn from(n: CliNetwork) -> Self {
        match n {
            CliNetwork::Preprod => Self::Preprod,
            CliNetwork::Mainnet => Self::Mainnet,
        }
    }
}

/// Parse a JSON argument, reading it from a file when prefixed with `@`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the text is not JSON.
pub fn json_arg(raw: &str) -> color_eyre::Result<Value> {
    let text = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).wrap_err_with(|| format!("reading {path}"))?,
        None => raw.to_string(),
    };
    serde_json::from_str(&text).wrap_err("payload is not valid JSON")
}
