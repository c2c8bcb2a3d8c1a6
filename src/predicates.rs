use log::debug;

use crate::classify;
use crate::state::LiquidityState;

/// The named boolean conditions the planner rules are built from, evaluated
/// once over a snapshot.
///
/// The tenth condition, `FEE_IN_BUDGET`, deliberately lives in the fee guard
/// instead: it must be evaluated per action at execution time, never cached
/// in the plan.
#[derive(Debug, Clone, Copy, Default)]
pub struct Predicates {
    pub has_enough_source_channels: bool,
    pub has_enough_sats_for_source_channel_onchain: bool,
    pub has_empty_sink_channels: bool,
    pub has_enough_sats_for_source_channel_in_sink_channels: bool,
    pub has_enough_sats_for_source_channel_in_account: bool,
    pub has_enough_sink_channels: bool,
    pub has_enough_sats_for_sink_channel_onchain: bool,
    pub has_enough_sats_for_sink_channel_in_source_channels: bool,
    pub has_enough_sats_for_sink_channel_in_account: bool,
}

impl Predicates {
    pub fn evaluate(state: &LiquidityState) -> Self {
        let spendable = state.spendable_onchain_sats();
        let account = state.account_balance_sats as i64;
        let sink_capacity = state.sink_channel_capacity_sats() as i64;
        let source_capacity = state.source_channel_capacity_sats() as i64;
        let sink_local = state.sink_total_local_sats() as i64;
        let source_local = state.source_total_local_sats() as i64;

        let (_, sink_to_close) = classify::split(&state.sink_channels, state.sink.close_ratio);

        let p = Self {
            has_enough_source_channels: state.source_channels.len()
                >= state.source.target_channel_count,
            has_enough_sats_for_source_channel_onchain: (state.required_for_source_channel_sats()
                as i64)
                < spendable,
            has_empty_sink_channels: !sink_to_close.is_empty(),
            has_enough_sats_for_source_channel_in_sink_channels: spendable + sink_local
                >= source_capacity,
            has_enough_sats_for_source_channel_in_account: spendable + account >= source_capacity,
            has_enough_sink_channels: state.sink_channels.len() - sink_to_close.len()
                >= state.sink.target_channel_count,
            has_enough_sats_for_sink_channel_onchain: sink_capacity < spendable,
            has_enough_sats_for_sink_channel_in_source_channels: source_local + spendable
                >= sink_capacity,
            has_enough_sats_for_sink_channel_in_account: spendable + account >= sink_capacity,
        };
        debug!("Predicates: {:?}", p);
        p
    }
}
