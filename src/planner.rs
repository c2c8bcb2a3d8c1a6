use log::info;

use crate::predicates::Predicates;

/// The liquidity-moving actions the executor knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Job {
    CloseEmptySinkChannels,
    OpenSinkChannel,
    AccountSendOnchain,
    DrainSourceChannels,
    OpenSourceChannel,
    HarvestSinkChannels,
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Job::CloseEmptySinkChannels => "close-empty-sink-channels",
            Job::OpenSinkChannel => "open-sink-channel",
            Job::AccountSendOnchain => "account-send-onchain",
            Job::DrainSourceChannels => "drain-source-channels",
            Job::OpenSourceChannel => "open-source-channel",
            Job::HarvestSinkChannels => "harvest-sink-channels",
        };
        write!(f, "{}", name)
    }
}

/// Map the predicate set through the fixed rule table into an ordered,
/// deduplicated job list.
///
/// Rule order matters: closures come before spend decisions (freed liquidity
/// only becomes visible on the next invocation, since the plan is built from
/// one snapshot), and opens are attempted on-chain first, then from
/// progressively less liquid pools (custodial account, then peer channel
/// liquidity). Rules three and six intentionally emit the same job; the
/// dedup pass collapses them.
pub fn plan(p: &Predicates) -> Vec<Job> {
    let mut jobs = Vec::new();

    if p.has_enough_source_channels && p.has_empty_sink_channels {
        jobs.push(Job::CloseEmptySinkChannels);
    }
    if !p.has_enough_sink_channels && p.has_enough_sats_for_sink_channel_onchain {
        jobs.push(Job::OpenSinkChannel);
    }
    if !p.has_enough_sats_for_sink_channel_onchain && p.has_enough_sats_for_sink_channel_in_account
    {
        jobs.push(Job::AccountSendOnchain);
    }
    if !p.has_enough_sats_for_sink_channel_in_account
        && p.has_enough_sats_for_sink_channel_in_source_channels
    {
        jobs.push(Job::DrainSourceChannels);
    }
    if !p.has_enough_source_channels && p.has_enough_sats_for_source_channel_onchain {
        jobs.push(Job::OpenSourceChannel);
    }
    if !p.has_enough_sats_for_source_channel_onchain
        && p.has_enough_sats_for_source_channel_in_account
    {
        jobs.push(Job::AccountSendOnchain);
    }
    if !p.has_enough_sats_for_source_channel_in_account
        && p.has_enough_sats_for_source_channel_in_sink_channels
    {
        jobs.push(Job::HarvestSinkChannels);
    }

    // Dedup preserving first occurrence
    let mut seen = std::collections::HashSet::new();
    jobs.retain(|job| seen.insert(*job));

    if jobs.is_empty() {
        info!("Planner: nothing to do");
    } else {
        info!(
            "Planner: {}",
            jobs.iter().map(|j| j.to_string()).collect::<Vec<_>>().join(", ")
        );
    }

    jobs
}
