mod classify;
mod client;
mod config;
mod drain;
mod executor;
mod guard;
mod notify;
mod oracle;
mod planner;
mod predicates;
mod state;
mod swap;

use clap::{Parser, Subcommand};
use config::Config;
use log::{error, info, warn};
use std::path::PathBuf;

use crate::client::NodeClient;
use crate::executor::Executor;
use crate::notify::Notifier;
use crate::oracle::FeeOracle;
use crate::predicates::Predicates;
use crate::state::LiquidityState;
use crate::swap::SwapService;

#[derive(Parser)]
#[command(name = "lnwarden", about = "Liquidity warden for a Lightning node")]
struct Cli {
    /// Path to lnwarden.toml config file
    #[arg(short, long, default_value = "lnwarden.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one control cycle and exit (default)
    Run,
    /// Build the snapshot and print the plan without executing it
    Plan,
}

// One invocation per process start; an external scheduler (cron or a systemd
// timer) provides the cadence and must not overlap invocations.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;

    env_logger::Builder::new()
        .filter_level(config.general.log_level.parse().unwrap_or(log::LevelFilter::Info))
        .format_timestamp_secs()
        .init();

    info!("lnwarden v{} starting", env!("CARGO_PKG_VERSION"));
    if config.general.dry_run {
        warn!("DRY-RUN MODE: No actions will be executed");
    }

    let node = client::RestNodeClient::new(&config.node)?;
    let swap = swap::RestSwapClient::new(&config.swap)?;
    let oracle = oracle::MempoolOracle::new(&config.oracle)?;
    let notifier = notify::from_config(&config.notify)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_cycle(&config, &node, &swap, &oracle, notifier.as_ref()).await,
        Commands::Plan => print_plan(&config, &node, &swap, &oracle).await,
    }
}

/// One full control cycle: snapshot, predicates, plan, execute.
///
/// Fails closed at the snapshot boundary: a builder error means no job is
/// planned or executed and the process exits non-zero.
async fn run_cycle(
    config: &Config,
    node: &dyn NodeClient,
    swap: &dyn SwapService,
    oracle: &dyn FeeOracle,
    notifier: &dyn Notifier,
) -> anyhow::Result<()> {
    let state = match LiquidityState::collect(config, node, swap, oracle).await {
        Ok(state) => state,
        Err(e) => {
            error!("Builder: snapshot failed, no actions taken: {:#}", e);
            let message = format!(
                "lnwarden: snapshot failed at {}, no actions taken: {:#}",
                chrono::Utc::now().to_rfc3339(),
                e
            );
            if let Err(notify_err) = notifier.send_message(&message).await {
                warn!("Notify: {:#}", notify_err);
            }
            return Err(e);
        }
    };

    let predicates = Predicates::evaluate(&state);
    let jobs = planner::plan(&predicates);
    notify_unfundable_deficits(&predicates, &jobs, notifier).await;
    if jobs.is_empty() {
        info!("Cycle complete: liquidity within targets");
        return Ok(());
    }

    let executor = Executor::new(
        node,
        swap,
        oracle,
        notifier,
        &config.oracle.tier,
        config.general.dry_run,
    );
    let report = executor.execute(&jobs, &state).await;

    info!(
        "Cycle complete: {} job(s), {} failed",
        report.results.len(),
        report.failed_count()
    );
    Ok(())
}

/// A channel group below its target with no job in the plan that could fund
/// it means every liquidity pool came up short: nothing will change until the
/// operator deposits sats, so tell them.
async fn notify_unfundable_deficits(
    predicates: &Predicates,
    jobs: &[planner::Job],
    notifier: &dyn Notifier,
) {
    use planner::Job;

    let sink_funding = [
        Job::OpenSinkChannel,
        Job::AccountSendOnchain,
        Job::DrainSourceChannels,
    ];
    let source_funding = [
        Job::OpenSourceChannel,
        Job::AccountSendOnchain,
        Job::HarvestSinkChannels,
    ];

    let mut starved = Vec::new();
    if !predicates.has_enough_sink_channels && !jobs.iter().any(|j| sink_funding.contains(j)) {
        starved.push("sink");
    }
    if !predicates.has_enough_source_channels && !jobs.iter().any(|j| source_funding.contains(j)) {
        starved.push("source");
    }
    if starved.is_empty() {
        return;
    }

    warn!(
        "Cycle: {} group(s) below target with no fundable pool",
        starved.join(" and ")
    );
    let message = format!(
        "lnwarden: {} group(s) below target channel count, but no liquidity pool holds enough sats to fund a channel; a deposit is needed",
        starved.join(" and ")
    );
    if let Err(e) = notifier.send_message(&message).await {
        warn!("Notify: {:#}", e);
    }
}

/// Audit mode: dump the full snapshot and the plan it produces.
async fn print_plan(
    config: &Config,
    node: &dyn NodeClient,
    swap: &dyn SwapService,
    oracle: &dyn FeeOracle,
) -> anyhow::Result<()> {
    let state = LiquidityState::collect(config, node, swap, oracle).await?;
    println!("{:#?}", state);

    let predicates = Predicates::evaluate(&state);
    println!("{:#?}", predicates);

    let jobs = planner::plan(&predicates);
    if jobs.is_empty() {
        println!("plan: (empty)");
    } else {
        for (i, job) in jobs.iter().enumerate() {
            println!("plan[{}]: {}", i, job);
        }
    }
    Ok(())
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::client::mock::{make_channel, MockNodeClient};
    use crate::notify::mock::RecordingNotifier;
    use crate::oracle::mock::StaticOracle;
    use crate::swap::mock::MockSwapService;

    fn test_config() -> Config {
        Config::test_default()
    }

    // -----------------------------------------------------------------------
    // Test 1: counts met, one empty sink channel, fee in budget -> the only
    // action is closing that channel.
    // -----------------------------------------------------------------------
    #[tokio::test]
    async fn test_cycle_closes_empty_sink_channel() {
        let config = test_config();
        let mut node = MockNodeClient::new();
        node.channels = vec![
            make_channel("s1", "sink_peer", 1_000_000, 500_000),
            make_channel("s2", "sink_peer", 1_000_000, 20_000), // 2% < 10% ratio
            make_channel("r1", "source_peer", 1_000_000, 500_000),
            make_channel("r2", "source_peer", 1_000_000, 500_000),
        ];
        node.confirmed_sats = 150_000;
        let swap = MockSwapService::new(0);
        let oracle = StaticOracle::new(10.0);
        let notifier = RecordingNotifier::new();

        run_cycle(&config, &node, &swap, &oracle, &notifier)
            .await
            .unwrap();

        let closes = node.close_channel_calls.lock().unwrap();
        assert_eq!(closes.len(), 1);
        assert_eq!(closes[0].0, "s2");
        assert!(node.open_channel_calls.lock().unwrap().is_empty());
        assert!(swap.send_onchain_calls.lock().unwrap().is_empty());
    }

    // -----------------------------------------------------------------------
    // Test 2: funds leaving the wallet (negative unconfirmed) suppress a
    // channel open even though the sink group is deficient.
    // -----------------------------------------------------------------------
    #[tokio::test]
    async fn test_cycle_waits_while_funds_in_flight() {
        let config = test_config();
        let mut node = MockNodeClient::new();
        node.channels = vec![
            make_channel("s1", "sink_peer", 5_000_000, 2_000_000),
            make_channel("r1", "source_peer", 1_000_000, 200_000),
            make_channel("r2", "source_peer", 1_000_000, 200_000),
        ];
        node.confirmed_sats = 6_000_000;
        node.unconfirmed_sats = -5_900_000; // channel-open broadcast in flight
        let swap = MockSwapService::new(0);
        let oracle = StaticOracle::new(10.0);
        let notifier = RecordingNotifier::new();

        run_cycle(&config, &node, &swap, &oracle, &notifier)
            .await
            .unwrap();

        // No duplicate open while the previous spend is unconfirmed
        assert!(node.open_channel_calls.lock().unwrap().is_empty());
    }

    // -----------------------------------------------------------------------
    // Test 3: sink group deficient with plenty on-chain -> a sink channel is
    // opened toward the sink peer.
    // -----------------------------------------------------------------------
    #[tokio::test]
    async fn test_cycle_opens_sink_channel_when_funded() {
        let config = test_config();
        let mut node = MockNodeClient::new();
        node.channels = vec![
            make_channel("s1", "sink_peer", 5_000_000, 2_000_000),
            make_channel("r1", "source_peer", 5_000_000, 2_000_000),
            make_channel("r2", "source_peer", 5_000_000, 2_000_000),
        ];
        node.confirmed_sats = 12_000_000;
        let swap = MockSwapService::new(0);
        let oracle = StaticOracle::new(10.0);
        let notifier = RecordingNotifier::new();

        run_cycle(&config, &node, &swap, &oracle, &notifier)
            .await
            .unwrap();

        let opens = node.open_channel_calls.lock().unwrap();
        assert_eq!(opens.len(), 1);
        assert_eq!(opens[0].peer_node_id, "sink_peer");
        assert_eq!(opens[0].capacity_sats, 5_000_000);
    }

    // -----------------------------------------------------------------------
    // Test 4: builder failure fails closed -- nothing is planned, nothing is
    // executed, the cycle errors and the operator is notified.
    // -----------------------------------------------------------------------
    #[tokio::test]
    async fn test_cycle_fails_closed_on_builder_error() {
        let config = test_config();
        let mut node = MockNodeClient::new();
        node.fail_reads = true;
        let swap = MockSwapService::new(1_000_000);
        let oracle = StaticOracle::new(10.0);
        let notifier = RecordingNotifier::new();

        let result = run_cycle(&config, &node, &swap, &oracle, &notifier).await;
        assert!(result.is_err());

        assert!(node.open_channel_calls.lock().unwrap().is_empty());
        assert!(node.close_channel_calls.lock().unwrap().is_empty());
        assert!(swap.send_onchain_calls.lock().unwrap().is_empty());
        let messages = notifier.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("snapshot failed"));
    }

    // -----------------------------------------------------------------------
    // Test 5: deficient sink group that no pool can fund -> no job runs, the
    // operator is told a deposit is needed.
    // -----------------------------------------------------------------------
    #[tokio::test]
    async fn test_cycle_notifies_unfundable_deficit() {
        let config = test_config();
        let mut node = MockNodeClient::new();
        node.channels = vec![
            make_channel("r1", "source_peer", 5_000_000, 2_000_000),
            make_channel("r2", "source_peer", 5_000_000, 2_000_000),
        ];
        node.confirmed_sats = 150_000;
        let swap = MockSwapService::new(0);
        let oracle = StaticOracle::new(10.0);
        let notifier = RecordingNotifier::new();

        run_cycle(&config, &node, &swap, &oracle, &notifier)
            .await
            .unwrap();

        assert!(node.open_channel_calls.lock().unwrap().is_empty());
        let messages = notifier.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("sink"));
        assert!(messages[0].contains("deposit"));
    }

    // -----------------------------------------------------------------------
    // Test 6: healthy node does nothing at all.
    // -----------------------------------------------------------------------
    #[tokio::test]
    async fn test_cycle_healthy_node_is_a_no_op() {
        let config = test_config();
        let mut node = MockNodeClient::new();
        node.channels = vec![
            make_channel("s1", "sink_peer", 5_000_000, 2_500_000),
            make_channel("s2", "sink_peer", 5_000_000, 2_500_000),
            make_channel("r1", "source_peer", 5_000_000, 2_500_000),
            make_channel("r2", "source_peer", 5_000_000, 2_500_000),
        ];
        node.confirmed_sats = 12_000_000;
        let swap = MockSwapService::new(4_000_000);
        let oracle = StaticOracle::new(10.0);
        let notifier = RecordingNotifier::new();

        run_cycle(&config, &node, &swap, &oracle, &notifier)
            .await
            .unwrap();

        assert!(node.open_channel_calls.lock().unwrap().is_empty());
        assert!(node.close_channel_calls.lock().unwrap().is_empty());
        assert!(node.pay_invoice_calls.lock().unwrap().is_empty());
        assert!(swap.send_onchain_calls.lock().unwrap().is_empty());
        assert!(notifier.messages.lock().unwrap().is_empty());
    }
}
