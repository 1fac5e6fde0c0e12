use alloy::primitives::utils::parse_units;
use alloy::primitives::U256;
use clap::{ArgAction, Args, Parser, Subcommand};
use color_eyre::eyre::{eyre, Context, Result};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;
use trove_chain::{connect_http, connect_wallet, ChainReader};
use trove_core::gauges::GaugeReader;
use trove_core::redeem::{RedemptionEngine, RedemptionSigner, MAX_HINT_ITERATIONS};
use trove_core::troves::{ensure_redeemable, TroveReader};
use trove_core::types::{wei_to_f64, SyncState};
use trove_core::{Indexer, IndexerConfig};
use trove_store::Store;

#[derive(Debug, Clone)]
struct AppContext {
    db_path: String,
}

#[derive(Parser, Debug)]
#[command(name = "trovewatch")]
#[command(about = "Trove lending protocol monitor and redemption toolkit")]
#[command(version)]
struct Cli {
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[arg(long, global = true, default_value = "data/trovewatch.sqlite")]
    db_path: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one synchronization pass and advance the watermark.
    Sync,
    /// Show stored row counts and the current watermark.
    Status,
    /// List the riskiest stored troves by collateralization ratio.
    Troves(TrovesArgs),
    /// Fetch live gauge incentives and epoch timing.
    Gauges(GaugesArgs),
    /// Compute redemption hints for an amount.
    Hints(HintsArgs),
    /// Simulate (and optionally submit) a redemption.
    Redeem(RedeemArgs),
}

#[derive(Args, Debug)]
struct TrovesArgs {
    #[arg(long, default_value_t = 20)]
    limit: u64,
}

#[derive(Args, Debug)]
struct GaugesArgs {
    /// Probe adjacent epochs for zero-amount rewards.
    #[arg(long)]
    probe_adjacent: bool,
}

#[derive(Args, Debug)]
struct HintsArgs {
    /// Stable-asset amount to redeem, in whole units (e.g. "2500.5").
    #[arg(long)]
    amount: String,

    #[arg(long, default_value_t = 100)]
    max_iterations: u64,
}

#[derive(Args, Debug)]
struct RedeemArgs {
    /// Stable-asset amount to redeem, in whole units.
    #[arg(long)]
    amount: String,

    #[arg(long, default_value_t = 100)]
    max_iterations: u64,

    /// Sender address for the dry run when no signer is configured.
    #[arg(long)]
    account: Option<String>,

    /// Submit the redemption instead of only simulating it.
    /// Requires REDEEMER_PRIVATE_KEY.
    #[arg(long)]
    execute: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet)?;

    let ctx = AppContext {
        db_path: cli.db_path,
    };

    match cli.command {
        Commands::Sync => handle_sync(&ctx).await,
        Commands::Status => handle_status(&ctx).await,
        Commands::Troves(args) => handle_troves(&ctx, args).await,
        Commands::Gauges(args) => handle_gauges(args).await,
        Commands::Hints(args) => handle_hints(args).await,
        Commands::Redeem(args) => handle_redeem(args).await,
    }
}

fn init_tracing(verbose: u8, quiet: bool) -> Result<()> {
    let level = if quiet {
        Level::WARN
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.as_str()))
        .wrap_err("failed to initialize tracing filter")?;

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn parse_stable_amount(raw: &str) -> Result<U256> {
    let parsed = parse_units(raw, 18)
        .wrap_err_with(|| format!("invalid stable-asset amount '{raw}'"))?;
    Ok(parsed.get_absolute())
}

async fn handle_sync(ctx: &AppContext) -> Result<()> {
    let config = IndexerConfig::from_env()?;
    let store = Store::new(&ctx.db_path).wrap_err("failed to open SQLite store")?;
    let state = SyncState {
        last_block: store.get_watermark()?,
    };

    let indexer = Indexer::connect(config, store).await?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .wrap_err("failed to create progress style")?,
    );
    pb.set_message("running synchronization pass");
    pb.enable_steady_tick(std::time::Duration::from_millis(100));

    let next = indexer.run(state).await.wrap_err("sync pass failed")?;

    pb.finish_with_message("sync completed");
    info!(
        watermark = ?next.last_block,
        db_path = %ctx.db_path,
        "sync command finished"
    );

    Ok(())
}

async fn handle_status(ctx: &AppContext) -> Result<()> {
    let store = Store::new(&ctx.db_path).wrap_err("failed to open SQLite store")?;
    let counts = store.counts().wrap_err("failed to query row counts")?;
    let watermark = store.get_watermark()?;

    let db_size_str = if ctx.db_path == ":memory:" {
        "N/A (in-memory)".to_string()
    } else {
        match std::fs::metadata(&ctx.db_path) {
            Ok(metadata) => format!("{} MB", metadata.len() / 1_000_000),
            Err(_) => "N/A (file not found)".to_string(),
        }
    };

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Metric", "Value"]);

    table.add_row(vec!["Database Path", ctx.db_path.as_str()]);
    table.add_row(vec!["DB Size", &db_size_str]);
    table.add_row(vec![
        "Watermark",
        &watermark
            .map(|block| block.to_string())
            .unwrap_or_else(|| "none (no completed pass)".to_string()),
    ]);
    table.add_row(vec!["Troves", &counts.troves.to_string()]);
    table.add_row(vec!["Liquidations", &counts.liquidations.to_string()]);
    table.add_row(vec!["Redemptions", &counts.redemptions.to_string()]);
    table.add_row(vec!["Snapshots", &counts.snapshots.to_string()]);
    table.add_row(vec!["Gauges", &counts.gauges.to_string()]);

    println!("\n{table}\n");

    info!(
        troves = counts.troves,
        liquidations = counts.liquidations,
        redemptions = counts.redemptions,
        db_path = %ctx.db_path,
        "status command completed"
    );

    Ok(())
}

async fn handle_troves(ctx: &AppContext, args: TrovesArgs) -> Result<()> {
    let store = Store::new(&ctx.db_path).wrap_err("failed to open SQLite store")?;
    let troves = store
        .riskiest_troves(args.limit)
        .wrap_err("failed to query troves")?;

    if troves.is_empty() {
        println!("No troves stored; run `trovewatch sync` first.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec![
        "Owner",
        "Collateral",
        "Principal Debt",
        "Interest",
        "CR",
    ]);

    for trove in &troves {
        table.add_row(vec![
            truncate_hex(&trove.owner),
            format!("{:.6}", trove.collateral),
            format!("{:.2}", trove.principal_debt),
            format!("{:.2}", trove.interest),
            format!("{:.4}", trove.collateralization_ratio),
        ]);
    }

    println!("\n{table}\n");

    info!(rows = troves.len(), "troves command completed");
    Ok(())
}

async fn handle_gauges(args: GaugesArgs) -> Result<()> {
    let config = IndexerConfig::from_env()?;
    let provider = connect_http(&config.trove_rpc_url).await?;
    let gauges = GaugeReader::new(ChainReader::new(provider));

    let timing = gauges.epoch_timing().await?;
    let incentives = gauges.fetch_incentives(args.probe_adjacent).await?;

    println!(
        "\nEpoch: start {} / end {} / vote end {} (now {})\n",
        timing.epoch_start, timing.epoch_end, timing.vote_end, timing.now
    );

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Pool", "Gauge", "Votes", "Bribe Rewards"]);

    for incentive in &incentives {
        let rewards: Vec<String> = incentive
            .rewards
            .iter()
            .map(|reward| {
                let mut entry = format!(
                    "{}: {}",
                    truncate_hex(&format!("{:#x}", reward.token)),
                    reward.amount
                );
                if let Some(previous) = reward.previous_epoch_amount {
                    entry.push_str(&format!(" (prev {previous})"));
                }
                if let Some(next) = reward.next_epoch_amount {
                    entry.push_str(&format!(" (next {next})"));
                }
                entry
            })
            .collect();

        table.add_row(vec![
            incentive
                .pool_name
                .clone()
                .unwrap_or_else(|| truncate_hex(&format!("{:#x}", incentive.pool))),
            truncate_hex(&format!("{:#x}", incentive.gauge)),
            incentive.votes.to_string(),
            rewards.join("; "),
        ]);
    }

    println!("{table}\n");

    info!(
        gauges = incentives.len(),
        probe_adjacent = args.probe_adjacent,
        "gauges command completed"
    );

    Ok(())
}

async fn handle_hints(args: HintsArgs) -> Result<()> {
    let amount = parse_stable_amount(&args.amount)?;
    let config = IndexerConfig::from_env()?;
    let provider = connect_http(&config.trove_rpc_url).await?;

    let troves = TroveReader::connect(ChainReader::new(provider.clone())).await?;
    let price = troves.fetch_price().await?;
    let status = troves.recovery_status(price).await?;
    ensure_redeemable(&status)?;

    let engine = RedemptionEngine::new(provider, troves.price_feed());
    let hints = engine
        .compute_hints(amount, args.max_iterations.min(MAX_HINT_ITERATIONS))
        .await?;

    if hints.truncated_amount.is_zero() {
        println!("Nothing redeemable for {} at the current price.", args.amount);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Field", "Value"]);
    table.add_row(vec![
        "Redeemable Amount".to_string(),
        format!("{:.2}", wei_to_f64(hints.truncated_amount)?),
    ]);
    table.add_row(vec![
        "First Redemption Hint".to_string(),
        format!("{:#x}", hints.first_redemption_hint),
    ]);
    table.add_row(vec![
        "Upper Hint".to_string(),
        format!("{:#x}", hints.upper_hint),
    ]);
    table.add_row(vec![
        "Lower Hint".to_string(),
        format!("{:#x}", hints.lower_hint),
    ]);
    table.add_row(vec![
        "Partial NICR".to_string(),
        hints.partial_redemption_nicr.to_string(),
    ]);

    println!("\n{table}\n");

    info!(amount = %args.amount, "hints command completed");
    Ok(())
}

async fn handle_redeem(args: RedeemArgs) -> Result<()> {
    let amount = parse_stable_amount(&args.amount)?;
    let config = IndexerConfig::from_env()?;
    let provider = connect_http(&config.trove_rpc_url).await?;

    let troves = TroveReader::connect(ChainReader::new(provider.clone())).await?;
    let price = troves.fetch_price().await?;
    let status = troves.recovery_status(price).await?;
    ensure_redeemable(&status)?;

    let mut engine = RedemptionEngine::new(provider, troves.price_feed());

    if args.execute {
        let key = config
            .redeemer_key
            .as_deref()
            .ok_or_else(|| eyre!("REDEEMER_PRIVATE_KEY is required for --execute"))?;
        let (wallet, address) = connect_wallet(&config.trove_rpc_url, key).await?;
        engine.set_signer(RedemptionSigner {
            provider: wallet,
            address,
        });
    }

    let max_iterations = args.max_iterations.min(MAX_HINT_ITERATIONS);
    let hints = engine.compute_hints(amount, max_iterations).await?;

    if hints.truncated_amount.is_zero() {
        println!("Nothing redeemable for {} at the current price.", args.amount);
        return Ok(());
    }

    if args.execute {
        let outcome = engine.execute(&hints, max_iterations).await?;
        println!(
            "Redeemed {:.2} stable units in {:#x} (gas estimate {})",
            wei_to_f64(outcome.truncated_amount)?,
            outcome.tx_hash,
            outcome.gas_estimate
        );
        info!(tx_hash = %outcome.tx_hash, "redeem command completed");
    } else {
        let account = args
            .account
            .as_deref()
            .map(|raw| {
                raw.parse::<alloy::primitives::Address>()
                    .wrap_err_with(|| format!("invalid --account address '{raw}'"))
            })
            .transpose()?;
        let simulation = engine.simulate(&hints, account, max_iterations).await?;
        println!(
            "Simulation: {:.2} stable units redeemable, gas estimate {}",
            wei_to_f64(simulation.truncated_amount)?,
            simulation.gas_estimate
        );
        info!(gas = simulation.gas_estimate, "redeem simulation completed");
    }

    Ok(())
}

/// Truncate a hex hash/address for compact table display.
fn truncate_hex(value: &str) -> String {
    if value.len() > 14 {
        format!("{}…{}", &value[..8], &value[value.len() - 4..])
    } else {
        value.to_string()
    }
}
