//! Channel lists for partial scans built from frequency history.

use stalink_supplicant::WifiConfig;

use crate::collaborators::ConfigStore;

/// Appends `freqs` to `set` without duplicates. `max_total` caps the whole
/// set and `max_new` the number added from this call; zero disables a cap.
/// Returns false once the total cap is hit.
pub fn add_limited(
    set: &mut Vec<u32>,
    freqs: impl IntoIterator<Item = u32>,
    max_total: usize,
    max_new: usize,
) -> bool {
    let mut allowed = if max_new == 0 { usize::MAX } else { max_new };
    for freq in freqs {
        if max_total > 0 && set.len() >= max_total {
            return false;
        }
        if allowed == 0 {
            return true;
        }
        if !set.contains(&freq) {
            set.push(freq);
            allowed -= 1;
        }
    }
    true
}

/// Channels for a partial scan while connected: the current channel first,
/// then where this network was recently seen.
pub fn for_connected_network(
    store: &dyn ConfigStore,
    network: &WifiConfig,
    current_freq: Option<u32>,
    max_channels: usize,
    age_ms: u64,
) -> Vec<u32> {
    let mut set = Vec::new();
    if let Some(freq) = current_freq.filter(|f| *f > 0) {
        set.push(freq);
    }
    add_limited(
        &mut set,
        store.frequency_history(&network.ssid, age_ms),
        max_channels,
        0,
    );
    set
}

/// Channels for the first scan after coming up disconnected, drawn from
/// all `networks` in order.
pub fn for_networks(
    store: &dyn ConfigStore,
    networks: &[WifiConfig],
    max_total: usize,
    max_per_network: usize,
    age_ms: u64,
) -> Vec<u32> {
    let mut set = Vec::new();
    for network in networks {
        if !add_limited(
            &mut set,
            store.frequency_history(&network.ssid, age_ms),
            max_total,
            max_per_network,
        ) {
            break;
        }
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_limited_respects_both_caps() {
        let mut set = vec![2412];
        assert!(add_limited(&mut set, [2412, 2437, 2462, 5180], 0, 2));
        assert_eq!(set, vec![2412, 2437, 2462]);
        assert!(!add_limited(&mut set, [5180, 5200, 5220], 4, 0));
        assert_eq!(set, vec![2412, 2437, 2462, 5180]);
    }

    #[test]
    fn zero_caps_mean_unlimited() {
        let mut set = Vec::new();
        assert!(add_limited(&mut set, [1, 2, 3, 4, 5], 0, 0));
        assert_eq!(set.len(), 5);
    }
}
