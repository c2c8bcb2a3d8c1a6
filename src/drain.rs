use log::{info, warn};

use crate::client::{NodeClient, PayError};
use crate::config::LoopOutConfig;
use crate::swap::SwapService;

/// Loop-out progress: a bounded number of invoice/pay attempts with the
/// invoice amount scaled by the backoff multiplier per attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    Attempting(u32),
    Succeeded,
    Exhausted,
}

#[derive(Debug)]
pub struct DrainReport {
    pub state: DrainState,
    pub attempts_used: u32,
    /// Satoshis verifiably moved into the account; set only on success.
    pub paid_sats: u64,
}

/// Move channel liquidity into the custodial account by paying one of its
/// invoices, retrying with scaled amounts until the attempt budget runs out.
///
/// Both "no route" and other payment failures are retryable here; balances
/// are only considered moved on a verified payment success, never
/// speculatively.
pub async fn run(
    node: &dyn NodeClient,
    swap: &dyn SwapService,
    cfg: &LoopOutConfig,
) -> anyhow::Result<DrainReport> {
    let mut state = DrainState::Attempting(0);

    loop {
        let i = match state {
            DrainState::Attempting(i) if i < cfg.attempts => i,
            DrainState::Attempting(_) => {
                state = DrainState::Exhausted;
                continue;
            }
            DrainState::Succeeded | DrainState::Exhausted => break,
        };

        let amount_sats = (cfg.amount_sats as f64 * cfg.backoff.powi(i as i32)).round() as u64;
        let max_fee_sats = amount_sats * cfg.max_routing_fee_ppm / 1_000_000;

        info!(
            "Drain: attempt {}/{} for {} sat (fee limit {} sat)",
            i + 1,
            cfg.attempts,
            amount_sats,
            max_fee_sats
        );

        let bolt11 = match swap.get_invoice(amount_sats).await {
            Ok(bolt11) => bolt11,
            Err(e) => {
                warn!("Drain: attempt {}: invoice request failed: {:#}", i + 1, e);
                state = DrainState::Attempting(i + 1);
                continue;
            }
        };

        match node.pay_invoice(&bolt11, max_fee_sats).await {
            Ok(_preimage) => {
                info!("Drain: paid {} sat into the account", amount_sats);
                return Ok(DrainReport {
                    state: DrainState::Succeeded,
                    attempts_used: i + 1,
                    paid_sats: amount_sats,
                });
            }
            Err(PayError::NoRoute) => {
                warn!("Drain: attempt {}: no route", i + 1);
                state = DrainState::Attempting(i + 1);
            }
            Err(e) => {
                warn!("Drain: attempt {}: {}", i + 1, e);
                state = DrainState::Attempting(i + 1);
            }
        }
    }

    info!("Drain: exhausted after {} attempts", cfg.attempts);
    Ok(DrainReport {
        state: DrainState::Exhausted,
        attempts_used: cfg.attempts,
        paid_sats: 0,
    })
}
