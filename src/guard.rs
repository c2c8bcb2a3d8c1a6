use log::{info, warn};

use crate::notify::Notifier;
use crate::oracle::FeeOracle;

/// The FEE_IN_BUDGET condition: pure and idempotent for a given rate/ceiling
/// pair.
pub fn fee_in_budget(feerate_sat_per_vb: f64, max_sat_per_vbyte: f64) -> bool {
    feerate_sat_per_vb <= max_sat_per_vbyte
}

/// Gates on-chain-fee-sensitive actions (opens, closes, account withdrawals)
/// against a configured ceiling.
///
/// Evaluated at execution time, not baked into the plan: the feerate is
/// re-fetched from the oracle for each action so a spike between snapshot and
/// execution still blocks the spend. When the refresh fails the snapshot rate
/// is used instead; it is at most one cycle old and a transient oracle outage
/// should not wedge every fee-sensitive job.
pub struct FeeGuard<'a> {
    oracle: &'a dyn FeeOracle,
    notifier: &'a dyn Notifier,
    tier: &'a str,
    snapshot_rate: f64,
}

impl<'a> FeeGuard<'a> {
    pub fn new(
        oracle: &'a dyn FeeOracle,
        notifier: &'a dyn Notifier,
        tier: &'a str,
        snapshot_rate: f64,
    ) -> Self {
        Self {
            oracle,
            notifier,
            tier,
            snapshot_rate,
        }
    }

    /// Returns the approved feerate if `action` may spend on-chain fees right
    /// now, so the broadcast uses the same rate the decision was made on. On
    /// denial the operator is notified with the rate and ceiling.
    pub async fn allow(&self, action: &str, max_sat_per_vbyte: f64) -> Option<f64> {
        let rate = match self.oracle.get_fee().await {
            Ok(tiers) => match tiers.rate(self.tier) {
                Ok(rate) => rate,
                Err(e) => {
                    warn!("Guard: {:#}, using snapshot rate", e);
                    self.snapshot_rate
                }
            },
            Err(e) => {
                warn!(
                    "Guard: feerate refresh failed ({:#}), using snapshot rate {:.1} sat/vB",
                    e, self.snapshot_rate
                );
                self.snapshot_rate
            }
        };

        if fee_in_budget(rate, max_sat_per_vbyte) {
            return Some(rate);
        }

        info!(
            "Guard: avoiding {} -- feerate {:.1} sat/vB above ceiling {:.1} sat/vB",
            action, rate, max_sat_per_vbyte
        );
        let message = format!(
            "lnwarden: action {} avoided, feerate {:.1} sat/vB exceeds ceiling {:.1} sat/vB",
            action, rate, max_sat_per_vbyte
        );
        if let Err(e) = self.notifier.send_message(&message).await {
            warn!("Guard: notification failed: {:#}", e);
        }
        None
    }
}
