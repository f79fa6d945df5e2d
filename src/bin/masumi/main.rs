//! masumi CLI entry point.

mod cli;

use clap::Parser;
use cli::{
    json_arg, AgentCommand, Cli, Command, HashCommand, LogFormat, PaymentCommand, PurchaseArgs,
    PurchaseCommand, WatchArgs,
};
use color_eyre::eyre::WrapErr;
use masumi_client::client::wire::AgentRegistration;
use masumi_client::{
    hash_input, hash_output, ClientConfig, DeadlineSchedule, HttpPaymentService,
    HttpRegistryClient, IntegrityHash, LifecycleStatus, MonitorEvent, Payment, PaymentRequest,
    PaymentService, Purchase, PurchaseRequest, PurchaserId, RegistryService, StatusMonitor,
};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let (text, json) = match cli.log_format {
        LogFormat::Text => (Some(fmt::layer().with_writer(std::io::stderr)), None),
        LogFormat::Json => (None, Some(fmt::layer().json().with_writer(std::io::stderr))),
    };
    tracing_subscriber::registry()
        .with(text)
        .with(json)
        .with(filter)
        .init();

    info!("masumi v{}", env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Command::Hash(cmd) => hash(cmd),
        Command::Init => init(&cli),
        Command::Payment(cmd) => payment(cmd, &cli.to_config()?).await,
        Command::Purchase(cmd) => purchase(cmd, &cli.to_config()?).await,
        Command::Agent(cmd) => agent(cmd, &cli.to_config()?).await,
    }
}

fn hash(cmd: &HashCommand) -> color_eyre::Result<()> {
    let digest = match cmd {
        HashCommand::Input { purchaser, payload } => {
            hash_input(&json_arg(payload)?, &PurchaserId::parse(purchaser)?)?
        }
        HashCommand::Output { payload } => hash_output(&json_arg(payload)?)?,
    };
    println!("{digest}");
    Ok(())
}

fn init(cli: &Cli) -> color_eyre::Result<()> {
    let config = cli.to_config()?;
    let path = cli.config_path();
    config
        .to_file(&path)
        .wrap_err_with(|| format!("writing {}", path.display()))?;
    println!("{}", path.display());
    Ok(())
}

fn payment_service(config: &ClientConfig) -> color_eyre::Result<Arc<dyn PaymentService>> {
    Ok(Arc::new(HttpPaymentService::new(config)?))
}

async fn payment(cmd: &PaymentCommand, config: &ClientConfig) -> color_eyre::Result<()> {
    let service = payment_service(config)?;
    match cmd {
        PaymentCommand::Create {
            agent,
            purchaser,
            input,
            amounts,
            metadata,
        } => {
            let mut request =
                PaymentRequest::with_windows(agent, purchaser, json_arg(input)?, &config.deadlines)?
                    .on_network(config.network);
            request.amounts.clone_from(amounts);
            if let Some(metadata) = metadata {
                request = request.with_metadata(metadata);
            }
            let mut payment = Payment::new(service, request);
            let id = payment.create_payment_request().await?;
            println!("blockchainIdentifier: {id}");
            if let Some(hash) = payment.input_hash() {
                println!("inputHash: {hash}");
            }
            print_schedule(payment.schedule());
        }
        PaymentCommand::Status(escrow) => {
            let payment =
                Payment::resume(service, config.network, &escrow.blockchain_identifier).await?;
            print_status(payment.status());
            if let Some(hash) = payment.result_hash() {
                println!("resultHash: {hash}");
            }
        }
        PaymentCommand::Watch(args) => {
            let payment =
                Payment::resume(service, config.network, &args.blockchain_identifier).await?;
            watch(payment.start_status_monitoring(interval(args, config))?).await;
        }
        PaymentCommand::SubmitResult {
            escrow,
            output,
            hash,
        } => {
            let digest: IntegrityHash = match (output, hash) {
                (Some(output), _) => hash_output(&json_arg(output)?)?,
                (None, Some(hash)) => hash.parse()?,
                (None, None) => color_eyre::eyre::bail!("pass --output or --hash"),
            };
            let id = &escrow.blockchain_identifier;
            let mut payment = Payment::resume(service, config.network, id).await?;
            payment.complete_payment(id, digest).await?;
            println!("resultHash: {digest}");
        }
        PaymentCommand::AuthorizeRefund(escrow) => {
            let id = &escrow.blockchain_identifier;
            let mut payment = Payment::resume(service, config.network, id).await?;
            payment.authorize_refund(id).await?;
            print_status(payment.status());
        }
    }
    Ok(())
}

async fn purchase(cmd: &PurchaseCommand, config: &ClientConfig) -> color_eyre::Result<()> {
    let service = payment_service(config)?;
    match cmd {
        PurchaseCommand::Create(args) => {
            let mut purchase = Purchase::new(service, purchase_request(args, config)?);
            let status = purchase.create_purchase_request().await?;
            if let Some(hash) = purchase.input_hash() {
                println!("inputHash: {hash}");
            }
            print_status(Some(status));
        }
        PurchaseCommand::Status(escrow) => {
            let purchase =
                Purchase::resume(service, config.network, &escrow.blockchain_identifier).await?;
            print_status(purchase.status());
            if let Some(hash) = purchase.result_hash() {
                println!("resultHash: {hash}");
            }
        }
        PurchaseCommand::Watch(args) => {
            let purchase =
                Purchase::resume(service, config.network, &args.blockchain_identifier).await?;
            watch(purchase.start_status_monitoring(interval(args, config))?).await;
        }
        PurchaseCommand::RequestRefund(escrow) => {
            let mut purchase =
                Purchase::resume(service, config.network, &escrow.blockchain_identifier).await?;
            purchase.request_refund().await?;
            print_status(purchase.status());
        }
        PurchaseCommand::CancelRefund(escrow) => {
            let mut purchase =
                Purchase::resume(service, config.network, &escrow.blockchain_identifier).await?;
            purchase.cancel_refund_request().await?;
            print_status(purchase.status());
        }
    }
    Ok(())
}

fn purchase_request(args: &PurchaseArgs, config: &ClientConfig) -> color_eyre::Result<PurchaseRequest> {
    let schedule = DeadlineSchedule::from_unix_secs(
        args.pay_by,
        args.submit_result,
        args.unlock,
        args.external_dispute_unlock,
    )?;
    let mut request = PurchaseRequest::new(
        &args.blockchain_identifier,
        &args.seller_vkey,
        &args.agent,
        &args.purchaser,
        schedule,
        json_arg(&args.input)?,
    )
    .on_network(config.network);
    request.amounts.clone_from(&args.amounts);
    if let Some(metadata) = &args.metadata {
        request = request.with_metadata(metadata);
    }
    Ok(request)
}

async fn agent(cmd: &AgentCommand, config: &ClientConfig) -> color_eyre::Result<()> {
    let registry = HttpRegistryClient::new(config)?;
    match cmd {
        AgentCommand::Register { file } => {
            let text = std::fs::read_to_string(file)
                .wrap_err_with(|| format!("reading {}", file.display()))?;
            let registration: AgentRegistration =
                serde_json::from_str(&text).wrap_err("invalid registration document")?;
            let entry = registry.register_agent(&registration).await?;
            println!("{}: {:?}", entry.name, entry.state);
        }
        AgentCommand::Status { wallet } => {
            let wallet = match wallet {
                Some(wallet) => wallet.clone(),
                None => registry.selling_wallet_vkey(config.network).await?,
            };
            for entry in registry.registration_status(config.network, &wallet).await? {
                let id = entry.agent_identifier.as_deref().unwrap_or("-");
                println!("{}\t{:?}\t{id}", entry.name, entry.state);
            }
        }
        AgentCommand::Wallet => {
            println!("{}", registry.selling_wallet_vkey(config.network).await?);
        }
    }
    Ok(())
}

fn interval(args: &WatchArgs, config: &ClientConfig) -> Duration {
    args.interval
        .map_or_else(|| config.monitor.poll_interval(), Duration::from_secs)
}

/// Print status changes until a terminal status or Ctrl-C.
async fn watch<S: LifecycleStatus + Display>(mut monitor: StatusMonitor<S>) {
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping monitor");
                monitor.cancel();
                break;
            }
            event = monitor.next_event() => match event {
                Some(MonitorEvent::StatusChanged(status)) => println!("{status}"),
                Some(MonitorEvent::PollError(e)) => warn!("Poll failed: {e}"),
                None => break,
            },
        }
    }
}

fn print_status<S: Display>(status: Option<S>) {
    match status {
        Some(status) => println!("status: {status}"),
        None => println!("status: not created"),
    }
}

fn print_schedule(schedule: &DeadlineSchedule) {
    println!("payByTime: {}", schedule.pay_by_time());
    println!("submitResultTime: {}", schedule.submit_result_time());
    println!("unlockTime: {}", schedule.unlock_time());
    println!(
        "externalDisputeUnlockTime: {}",
        schedule.external_dispute_unlock_time()
    );
}
