use log::{error, info, warn};

use crate::classify;
use crate::client::{ChannelTemplate, NodeClient};
use crate::config::RoleConfig;
use crate::drain::{self, DrainState};
use crate::guard::FeeGuard;
use crate::notify::Notifier;
use crate::oracle::FeeOracle;
use crate::planner::Job;
use crate::state::LiquidityState;
use crate::swap::SwapService;

/// Outcome of one job in the execution report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded(String),
    Skipped(String),
    Failed(String),
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Succeeded(detail) => write!(f, "succeeded: {}", detail),
            Outcome::Skipped(reason) => write!(f, "skipped: {}", reason),
            Outcome::Failed(cause) => write!(f, "failed: {}", cause),
        }
    }
}

#[derive(Debug, Default)]
pub struct ExecutionReport {
    pub results: Vec<(Job, Outcome)>,
}

impl ExecutionReport {
    pub fn failed_count(&self) -> usize {
        self.results
            .iter()
            .filter(|(_, o)| matches!(o, Outcome::Failed(_)))
            .count()
    }
}

/// Runs a job plan strictly in order against the collaborators.
///
/// One job's failure never aborts the remaining plan: jobs act on
/// independent liquidity pools, and collaborator state may have moved since
/// the snapshot was taken, so every mutating-call failure is recorded as a
/// per-job outcome and execution continues.
pub struct Executor<'a> {
    node: &'a dyn NodeClient,
    swap: &'a dyn SwapService,
    oracle: &'a dyn FeeOracle,
    notifier: &'a dyn Notifier,
    fee_tier: &'a str,
    dry_run: bool,
}

impl<'a> Executor<'a> {
    pub fn new(
        node: &'a dyn NodeClient,
        swap: &'a dyn SwapService,
        oracle: &'a dyn FeeOracle,
        notifier: &'a dyn Notifier,
        fee_tier: &'a str,
        dry_run: bool,
    ) -> Self {
        Self {
            node,
            swap,
            oracle,
            notifier,
            fee_tier,
            dry_run,
        }
    }

    pub async fn execute(&self, plan: &[Job], state: &LiquidityState) -> ExecutionReport {
        let guard = FeeGuard::new(
            self.oracle,
            self.notifier,
            self.fee_tier,
            state.feerate_sat_per_vb,
        );

        let mut report = ExecutionReport::default();
        for job in plan {
            info!("Executor: running {}", job);
            let outcome = match self.run_job(*job, state, &guard).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Executor: {} failed: {:#}", job, e);
                    Outcome::Failed(format!("{e:#}"))
                }
            };
            // Failures here mean collaborator state moved since the snapshot
            // (stale balances, rejected spends): user action may help, so
            // they go through the notify collaborator as well as the log.
            if let Outcome::Failed(cause) = &outcome {
                let message = format!("lnwarden: {} failed: {}", job, cause);
                if let Err(e) = self.notifier.send_message(&message).await {
                    warn!("Executor: notification failed: {:#}", e);
                }
            }
            info!("Executor: {} {}", job, outcome);
            report.results.push((*job, outcome));
        }
        report
    }

    async fn run_job(
        &self,
        job: Job,
        state: &LiquidityState,
        guard: &FeeGuard<'_>,
    ) -> anyhow::Result<Outcome> {
        match job {
            Job::CloseEmptySinkChannels => self.close_empty_sink_channels(state, guard).await,
            Job::OpenSinkChannel => {
                self.open_channel(
                    job,
                    &state.sink,
                    state.sink_channel_capacity_sats(),
                    guard,
                )
                .await
            }
            Job::OpenSourceChannel => {
                self.open_channel(
                    job,
                    &state.source,
                    state.source_channel_capacity_sats(),
                    guard,
                )
                .await
            }
            Job::AccountSendOnchain => self.account_send_onchain(state, guard).await,
            Job::DrainSourceChannels => self.loop_out(job, state, &state.source_channels).await,
            Job::HarvestSinkChannels => self.loop_out(job, state, &state.sink_channels).await,
        }
    }

    async fn close_empty_sink_channels(
        &self,
        state: &LiquidityState,
        guard: &FeeGuard<'_>,
    ) -> anyhow::Result<Outcome> {
        let (_, to_close) = classify::split(&state.sink_channels, state.sink.close_ratio);
        if to_close.is_empty() {
            return Ok(Outcome::Skipped("no close-eligible channels".to_string()));
        }
        let Some(feerate) = guard
            .allow("close-empty-sink-channels", state.sink.max_sat_per_vbyte)
            .await
        else {
            return Ok(Outcome::Skipped("fee too high".to_string()));
        };
        if self.dry_run {
            info!(
                "Executor: dry-run, would close {} sink channel(s)",
                to_close.len()
            );
            return Ok(Outcome::Skipped("dry-run".to_string()));
        }

        let mut closed = 0usize;
        let mut failures = Vec::new();
        for ch in &to_close {
            match self.node.close_channel(&ch.channel_id, feerate).await {
                Ok(txid) => {
                    info!(
                        "Executor: closing channel {} ({} sat local) -- txid {}",
                        ch.channel_id, ch.local_balance_sats, txid
                    );
                    closed += 1;
                }
                Err(e) => {
                    error!("Executor: close of {} failed: {:#}", ch.channel_id, e);
                    failures.push(ch.channel_id.clone());
                }
            }
        }

        if failures.is_empty() {
            Ok(Outcome::Succeeded(format!("closed {} channel(s)", closed)))
        } else {
            Ok(Outcome::Failed(format!(
                "closed {} channel(s), failed to close: {}",
                closed,
                failures.join(", ")
            )))
        }
    }

    async fn open_channel(
        &self,
        job: Job,
        role: &RoleConfig,
        capacity_sats: u64,
        guard: &FeeGuard<'_>,
    ) -> anyhow::Result<Outcome> {
        if guard
            .allow(&job.to_string(), role.max_sat_per_vbyte)
            .await
            .is_none()
        {
            return Ok(Outcome::Skipped("fee too high".to_string()));
        }
        if self.dry_run {
            info!(
                "Executor: dry-run, would open {} sat channel to {}",
                capacity_sats, role.peer_node_id
            );
            return Ok(Outcome::Skipped("dry-run".to_string()));
        }

        let template = ChannelTemplate {
            peer_node_id: role.peer_node_id.clone(),
            capacity_sats,
            base_fee_msat: role.base_fee_msat,
            fee_ppm: role.fee_ppm,
            cltv_delta: role.cltv_delta,
            min_htlc_sats: role.min_htlc_sats,
        };
        let txid = self.node.open_channel(&template).await?;
        Ok(Outcome::Succeeded(format!(
            "opened {} sat channel to {}, funding txid {}",
            capacity_sats, role.peer_node_id, txid
        )))
    }

    async fn account_send_onchain(
        &self,
        state: &LiquidityState,
        guard: &FeeGuard<'_>,
    ) -> anyhow::Result<Outcome> {
        // Cover the neediest role's channel requirement and sweep any excess
        // above the account ceiling, bounded by what the account holds.
        let required = state
            .required_for_sink_channel_sats()
            .max(state.required_for_source_channel_sats());
        let shortfall = (required as i64 - state.spendable_onchain_sats()).max(0) as u64;
        let excess = state
            .account_balance_sats
            .saturating_sub(state.loop_out.max_account_balance_sats);
        let amount = shortfall.max(excess).min(state.account_balance_sats);

        if amount == 0 {
            return Ok(Outcome::Skipped("nothing to withdraw".to_string()));
        }
        let Some(feerate) = guard
            .allow("account-send-onchain", state.source.max_sat_per_vbyte)
            .await
        else {
            return Ok(Outcome::Skipped("fee too high".to_string()));
        };
        if self.dry_run {
            info!("Executor: dry-run, would withdraw {} sat on-chain", amount);
            return Ok(Outcome::Skipped("dry-run".to_string()));
        }

        match self.swap.get_onchain_fee(amount).await {
            Ok(fee) => info!(
                "Executor: account withdrawal of {} sat quoted at {} sat fee",
                amount, fee
            ),
            Err(e) => warn!("Executor: withdrawal fee quote failed: {:#}", e),
        }

        self.swap.send_onchain(amount, feerate).await?;
        Ok(Outcome::Succeeded(format!(
            "withdrew {} sat toward the wallet",
            amount
        )))
    }

    async fn loop_out(
        &self,
        job: Job,
        state: &LiquidityState,
        channels: &[crate::state::ChannelState],
    ) -> anyhow::Result<Outcome> {
        let drainable: u64 = channels
            .iter()
            .map(|c| c.local_balance_sats.saturating_sub(c.local_reserve_sats))
            .sum();
        info!(
            "Executor: {} over {} channel(s), {} sat drainable",
            job,
            channels.len(),
            drainable
        );

        if self.dry_run {
            return Ok(Outcome::Skipped("dry-run".to_string()));
        }

        let report = drain::run(self.node, self.swap, &state.loop_out).await?;
        match report.state {
            DrainState::Succeeded => Ok(Outcome::Succeeded(format!(
                "looped out {} sat in {} attempt(s)",
                report.paid_sats, report.attempts_used
            ))),
            DrainState::Exhausted => Ok(Outcome::Failed(format!(
                "all {} loop-out attempts failed",
                report.attempts_used
            ))),
            DrainState::Attempting(_) => unreachable!("drain engine returns a terminal state"),
        }
    }
}
