use anyhow::Context;
use log::debug;
use std::collections::HashSet;

use crate::client::NodeClient;
use crate::config::{Config, LoopOutConfig, RoleConfig};
use crate::oracle::FeeOracle;
use crate::swap::SwapService;

/// One channel's balance picture. Owned by the snapshot, rebuilt every
/// invocation, never mutated in place.
#[derive(Debug, Clone)]
pub struct ChannelState {
    pub channel_id: String,
    pub capacity_sats: u64,
    pub local_balance_sats: u64,
    pub local_reserve_sats: u64,
}

/// Immutable point-in-time snapshot of all three liquidity pools: the
/// on-chain wallet, the channel groups and the custodial account.
///
/// Built exactly once per invocation. Everything downstream only reads it.
#[derive(Debug)]
pub struct LiquidityState {
    pub sink_channels: Vec<ChannelState>,
    pub source_channels: Vec<ChannelState>,
    pub onchain_confirmed_sats: u64,
    /// Signed: a large negative value means funds are leaving the wallet
    /// (e.g. a channel-open broadcast in flight), a reason to wait rather
    /// than double-open.
    pub onchain_unconfirmed_sats: i64,
    pub account_balance_sats: u64,
    /// Oracle rate for the configured tier at snapshot time (sat/vB).
    pub feerate_sat_per_vb: f64,
    pub sink: RoleConfig,
    pub source: RoleConfig,
    pub loop_out: LoopOutConfig,
    pub min_onchain_sats: u64,
}

impl LiquidityState {
    /// Collect a fresh snapshot from the collaborators.
    ///
    /// Fails closed: any collaborator error propagates and no jobs are
    /// planned or executed this invocation.
    pub async fn collect(
        config: &Config,
        node: &dyn NodeClient,
        swap: &dyn SwapService,
        oracle: &dyn FeeOracle,
    ) -> anyhow::Result<Self> {
        // Config validation rejects this at startup; re-check here since the
        // channel capacity division below depends on it.
        anyhow::ensure!(
            config.sink.target_channel_count > 0 && config.source.target_channel_count > 0,
            "target_channel_count must be non-zero for both roles"
        );

        let channels = node
            .get_opened_channels()
            .await
            .context("Builder: listing channels")?;
        // One read for both halves so confirmed and unconfirmed describe the
        // same instant; a block between two fetches would skew spendable.
        let wallet = node
            .get_wallet_balance()
            .await
            .context("Builder: reading wallet balance")?;
        let account = swap
            .get_balance()
            .await
            .context("Builder: reading custodial account balance")?;
        let tiers = oracle.get_fee().await.context("Builder: fetching feerate")?;
        let feerate = tiers.rate(&config.oracle.tier)?;

        let mut sink_channels = Vec::new();
        let mut source_channels = Vec::new();
        for ch in channels {
            anyhow::ensure!(
                ch.capacity_sats > 0,
                "Builder: channel {} reports zero capacity",
                ch.channel_id
            );
            let state = ChannelState {
                channel_id: ch.channel_id,
                capacity_sats: ch.capacity_sats,
                local_balance_sats: ch.local_balance_sats,
                local_reserve_sats: ch.local_reserve_sats,
            };
            if ch.counterparty_node_id == config.sink.peer_node_id {
                sink_channels.push(state);
            } else if ch.counterparty_node_id == config.source.peer_node_id {
                source_channels.push(state);
            } else {
                debug!(
                    "Builder: ignoring channel {} to unmanaged peer {}",
                    state.channel_id, ch.counterparty_node_id
                );
            }
        }

        for (role, group) in [("sink", &sink_channels), ("source", &source_channels)] {
            let mut seen = HashSet::new();
            for ch in group.iter() {
                anyhow::ensure!(
                    seen.insert(ch.channel_id.as_str()),
                    "Builder: duplicate {} channel id {}",
                    role,
                    ch.channel_id
                );
            }
        }

        debug!(
            "Builder: {} sink / {} source channels, {} sat confirmed, {} sat unconfirmed, \
             {} sat in account, feerate {:.1} sat/vB",
            sink_channels.len(),
            source_channels.len(),
            wallet.confirmed_sats,
            wallet.unconfirmed_sats,
            account,
            feerate,
        );

        Ok(Self {
            sink_channels,
            source_channels,
            onchain_confirmed_sats: wallet.confirmed_sats,
            onchain_unconfirmed_sats: wallet.unconfirmed_sats,
            account_balance_sats: account,
            feerate_sat_per_vb: feerate,
            sink: config.sink.clone(),
            source: config.source.clone(),
            loop_out: config.loop_out.clone(),
            min_onchain_sats: config.general.min_onchain_sats,
        })
    }

    /// Spendable on-chain satoshis above the configured floor. May be
    /// negative while outgoing funds are unconfirmed.
    pub fn spendable_onchain_sats(&self) -> i64 {
        self.onchain_confirmed_sats as i64 + self.onchain_unconfirmed_sats
            - self.min_onchain_sats as i64
    }

    /// Capacity of one new sink channel: the role budget split across the
    /// target channel count.
    pub fn sink_channel_capacity_sats(&self) -> u64 {
        self.sink.budget_sats / self.sink.target_channel_count as u64
    }

    pub fn source_channel_capacity_sats(&self) -> u64 {
        self.source.budget_sats / self.source.target_channel_count as u64
    }

    /// On-chain satoshis required to fund one new sink channel while keeping
    /// the floor intact.
    pub fn required_for_sink_channel_sats(&self) -> u64 {
        self.sink_channel_capacity_sats() + self.min_onchain_sats
    }

    pub fn required_for_source_channel_sats(&self) -> u64 {
        self.source_channel_capacity_sats() + self.min_onchain_sats
    }

    pub fn sink_total_local_sats(&self) -> u64 {
        self.sink_channels.iter().map(|c| c.local_balance_sats).sum()
    }

    pub fn source_total_local_sats(&self) -> u64 {
        self.source_channels.iter().map(|c| c.local_balance_sats).sum()
    }

    /// Literal snapshot for tests, bypassing the collaborators.
    #[cfg(test)]
    pub fn test_default() -> Self {
        let config = Config::test_default();
        Self {
            sink_channels: vec![],
            source_channels: vec![],
            onchain_confirmed_sats: 0,
            onchain_unconfirmed_sats: 0,
            account_balance_sats: 0,
            feerate_sat_per_vb: 10.0,
            sink: config.sink,
            source: config.source,
            loop_out: config.loop_out,
            min_onchain_sats: config.general.min_onchain_sats,
        }
    }
}

#[cfg(test)]
pub fn test_channel(id: &str, capacity: u64, local: u64) -> ChannelState {
    ChannelState {
        channel_id: id.to_string(),
        capacity_sats: capacity,
        local_balance_sats: local,
        local_reserve_sats: capacity / 100,
    }
}
