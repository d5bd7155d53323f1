//! SwapScout - multi-provider swap quotes, verified by simulation
//!
//! Run with: cargo run -- quote --chain 8453 --sell USDC --buy WETH --amount 500000000 --swapper 0x...
//!
//! The binary talks to a remote aggregator (`PROXY_ENDPOINT`); quote providers
//! are plugged in by embedders of the library.

use alloy_primitives::{Address, U256};
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};
use console::style;
use futures::{stream, StreamExt};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use swapscout::aggregator::{AggregatorBuilder, QuoteSet};
use swapscout::strategy::{self, SelectionStrategy};
use swapscout::tokens;
use swapscout::{RpcWallet, Settings, SimulatedQuote, SwapRequest, Wallet};

#[derive(Parser, Debug)]
#[command(name = "swapscout", version, about = "Multi-provider swap quote aggregation")]
struct Cli {
    /// TOML settings file (defaults to environment / .env)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the effective configuration
    Config {
        /// Also write it to this TOML file
        #[arg(long, value_name = "FILE")]
        save: Option<PathBuf>,
    },
    /// Fetch and simulate quotes, then pick a winner
    Quote(SwapArgs),
    /// Quote, select and execute with PRIVATE_KEY
    Swap(SwapArgs),
}

#[derive(Args, Debug)]
struct SwapArgs {
    #[arg(long, default_value_t = tokens::BASE)]
    chain: u64,
    /// Token to sell: symbol, ETH, or address
    #[arg(long)]
    sell: String,
    /// Token to buy: symbol, ETH, or address
    #[arg(long)]
    buy: String,
    /// Amount in base units
    #[arg(long)]
    amount: U256,
    /// Treat `amount` as the output to receive
    #[arg(long)]
    target_out: bool,
    #[arg(long, default_value_t = 50)]
    slippage_bps: u16,
    /// Swapper address (`quote` only; `swap` uses the signer)
    #[arg(long)]
    swapper: Option<Address>,
    #[arg(long)]
    recipient: Option<Address>,
    /// Override the configured selection strategy
    #[arg(long)]
    strategy: Option<SelectionStrategy>,
}

impl SwapArgs {
    fn request(&self, swapper: Address) -> Result<SwapRequest> {
        let sell = tokens::resolve(self.chain, &self.sell)
            .ok_or_else(|| eyre!("unknown token {} on chain {}", self.sell, self.chain))?;
        let buy = tokens::resolve(self.chain, &self.buy)
            .ok_or_else(|| eyre!("unknown token {} on chain {}", self.buy, self.chain))?;

        let request = if self.target_out {
            SwapRequest::target_out(self.chain, sell, buy, self.amount, swapper)
        } else {
            SwapRequest::exact_in(self.chain, sell, buy, self.amount, swapper)
        };
        let request = request.with_slippage_bps(self.slippage_bps);
        Ok(match self.recipient {
            Some(recipient) => request.with_recipient(recipient),
            None => request,
        })
    }
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!("{}", style(" 🔭 SWAPSCOUT - Quote Aggregation").cyan().bold());
    println!(
        "{}",
        style("    Fetch | Simulate | Select | Execute").cyan()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

fn print_quote(chain_id: u64, request: &SwapRequest, quote: &SimulatedQuote) {
    let symbol = tokens::get_symbol(chain_id, &request.output_token());
    match (quote.successful_quote(), quote.metrics.as_ref()) {
        (Some(q), Some(metrics)) => println!(
            "{} {:<16} quoted {} {} | simulated {} | gas {} | Δ {} bps | {} ms",
            style("✓").green(),
            style(quote.provider()).cyan(),
            q.output_amount,
            symbol,
            metrics.output_amount,
            metrics.gas_used,
            metrics.price_delta_bps,
            metrics.latency_ms,
        ),
        _ => println!(
            "{} {:<16} {}",
            style("✗").red(),
            style(quote.provider()).cyan(),
            describe_failure(quote),
        ),
    }
}

fn describe_failure(quote: &SimulatedQuote) -> String {
    match (&quote.quote, &quote.simulation) {
        (swapscout::Quote::Failed(f), _) => f.error.to_string(),
        (_, swapscout::SimulationResult::Failure { error }) => error.to_string(),
        _ => "unknown".to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("swapscout=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    print_banner();

    let settings = match &cli.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::from_env()?,
    };
    if let Err(e) = settings.validate() {
        error!("Configuration validation failed: {}", e);
        error!("Please check your .env file");
        return Err(e.into());
    }

    match cli.command {
        Command::Config { save } => {
            settings.print_summary();
            if let Some(path) = save {
                settings.save_to_file(&path)?;
                info!(path = %path.display(), "settings written");
            }
            Ok(())
        }
        Command::Quote(args) => {
            let swapper = args
                .swapper
                .ok_or_else(|| eyre!("--swapper is required for quoting"))?;
            quote(&settings, &args, swapper).await
        }
        Command::Swap(args) => swap(&settings, &args).await,
    }
}

async fn quote(settings: &Settings, args: &SwapArgs, swapper: Address) -> Result<()> {
    let aggregator = AggregatorBuilder::from_settings(settings)?.build()?;
    let request = args.request(swapper)?;
    let strategy = match &args.strategy {
        Some(s) => s.clone(),
        None => aggregator.strategy().clone(),
    };

    println!("{}", style("═══ QUOTES (completion order) ═══").blue().bold());
    let set = aggregator.simulated_quotes(&request).await?;
    let mut arrived = Vec::new();
    let mut results = set.into_stream();
    while let Some(item) = results.next().await {
        print_quote(args.chain, &request, &item.result);
        arrived.push(item);
    }

    let winner = strategy::select(QuoteSet::from_stream(stream::iter(arrived)), &strategy).await?;
    println!();
    match winner {
        Some(winner) => println!(
            "{} {} wins under {}",
            style("🏆").yellow(),
            style(winner.provider()).green().bold(),
            strategy.name()
        ),
        None => println!("{}", style("No quote survived simulation.").yellow()),
    }
    Ok(())
}

async fn swap(settings: &Settings, args: &SwapArgs) -> Result<()> {
    let rpc_url = settings
        .rpc_urls
        .get(&args.chain.to_string())
        .ok_or_else(|| eyre!("no RPC URL configured for chain {}", args.chain))?;
    let wallet = RpcWallet::from_env(rpc_url)?
        .with_receipt_polling(settings.batch_poll_interval(), settings.batch_timeout());
    info!(address = %wallet.address(), "wallet loaded");

    let mut builder = AggregatorBuilder::from_settings(settings)?;
    if let Some(strategy) = &args.strategy {
        builder = builder.strategy(strategy.clone());
    }
    let aggregator = builder.build()?;
    let request = args.request(wallet.address())?;

    println!("{}", style("═══ EXECUTION ═══").yellow().bold());
    match aggregator.swap(&wallet, &request).await? {
        Some(settlement) => println!(
            "{} settled {:?} via {:?}",
            style("✓").green(),
            settlement.hash,
            settlement.mode
        ),
        None => println!("{}", style("No executable quote; nothing sent.").yellow()),
    }
    Ok(())
}
