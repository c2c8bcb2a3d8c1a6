use crate::state::ChannelState;

/// Partition a channel group into retained and close-eligible channels.
///
/// A channel is close-eligible iff `local_balance / capacity < close_ratio`,
/// strict: a channel sitting exactly on the ratio is retained. The ratio is
/// evaluated per channel, never on aggregated totals.
///
/// Capacity is guaranteed non-zero by the snapshot builder.
pub fn split(
    channels: &[ChannelState],
    close_ratio: f64,
) -> (Vec<&ChannelState>, Vec<&ChannelState>) {
    let mut retained = Vec::new();
    let mut to_close = Vec::new();
    for ch in channels {
        let ratio = ch.local_balance_sats as f64 / ch.capacity_sats as f64;
        if ratio < close_ratio {
            to_close.push(ch);
        } else {
            retained.push(ch);
        }
    }
    (retained, to_close)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ch(id: &str, capacity: u64, local: u64) -> ChannelState {
        ChannelState {
            channel_id: id.to_string(),
            capacity_sats: capacity,
            local_balance_sats: local,
            local_reserve_sats: 0,
        }
    }

    #[test]
    fn test_split_empty_list() {
        let (retained, to_close) = split(&[], 0.1);
        assert!(retained.is_empty());
        assert!(to_close.is_empty());
    }

    #[test]
    fn test_split_below_ratio_is_close_eligible() {
        let channels = vec![ch("a", 1_000_000, 50_000)]; // 5% < 10%
        let (retained, to_close) = split(&channels, 0.1);
        assert!(retained.is_empty());
        assert_eq!(to_close.len(), 1);
        assert_eq!(to_close[0].channel_id, "a");
    }

    #[test]
    fn test_split_exactly_on_ratio_is_retained() {
        // 100_000 / 1_000_000 == 0.1 exactly: strict comparison retains it
        let channels = vec![ch("a", 1_000_000, 100_000)];
        let (retained, to_close) = split(&channels, 0.1);
        assert_eq!(retained.len(), 1);
        assert!(to_close.is_empty());
    }

    #[test]
    fn test_split_mixed() {
        let channels = vec![
            ch("full", 1_000_000, 900_000),
            ch("empty", 1_000_000, 10_000),
            ch("boundary", 1_000_000, 100_000),
        ];
        let (retained, to_close) = split(&channels, 0.1);
        assert_eq!(retained.len(), 2);
        assert_eq!(to_close.len(), 1);
        assert_eq!(to_close[0].channel_id, "empty");
    }

    #[test]
    fn test_split_ratio_zero_retains_everything() {
        let channels = vec![ch("drained", 1_000_000, 0)];
        let (retained, to_close) = split(&channels, 0.0);
        // 0 / capacity == 0.0, not < 0.0
        assert_eq!(retained.len(), 1);
        assert!(to_close.is_empty());
    }
}
