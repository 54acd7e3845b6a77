//! Subscription set reconciliation.
//!
//! Computes the minimal subscribe/unsubscribe delta between the set the
//! connection believes is active and the set the application wants.

use crate::Instrument;
use std::collections::BTreeSet;

/// Delta between an active and a desired instrument set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionDelta {
    /// `desired - active`.
    pub to_subscribe: BTreeSet<Instrument>,
    /// `active - desired`.
    pub to_unsubscribe: BTreeSet<Instrument>,
}

impl SubscriptionDelta {
    /// True when no wire command is needed.
    pub fn is_empty(&self) -> bool {
        self.to_subscribe.is_empty() && self.to_unsubscribe.is_empty()
    }
}

/// Compute the delta that turns `active` into `desired`.
///
/// `Instrument` is already case-normalized, so set membership is
/// case-insensitive with respect to the original symbols.
pub fn reconcile(
    active: &BTreeSet<Instrument>,
    desired: &BTreeSet<Instrument>,
) -> SubscriptionDelta {
    SubscriptionDelta {
        to_subscribe: desired.difference(active).cloned().collect(),
        to_unsubscribe: active.difference(desired).cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(symbols: &[&str]) -> BTreeSet<Instrument> {
        symbols.iter().map(|s| Instrument::new(s).unwrap()).collect()
    }

    #[test]
    fn test_identical_sets_are_noop() {
        let s = set(&["btcusdt", "ethusdt"]);
        let delta = reconcile(&s, &s);
        assert!(delta.is_empty());
    }

    #[test]
    fn test_empty_to_desired() {
        let delta = reconcile(&BTreeSet::new(), &set(&["btcusdt"]));
        assert_eq!(delta.to_subscribe, set(&["btcusdt"]));
        assert!(delta.to_unsubscribe.is_empty());
    }

    #[test]
    fn test_add_and_remove() {
        let active = set(&["btcusdt", "ethusdt"]);
        let desired = set(&["ethusdt", "solusdt"]);
        let delta = reconcile(&active, &desired);
        assert_eq!(delta.to_subscribe, set(&["solusdt"]));
        assert_eq!(delta.to_unsubscribe, set(&["btcusdt"]));
    }

    #[test]
    fn test_case_insensitive_membership() {
        let active = set(&["BTCUSDT"]);
        let desired = set(&["btcusdt"]);
        assert!(reconcile(&active, &desired).is_empty());
    }

    #[test]
    fn test_delta_properties_over_combinations() {
        let universe = ["a1", "b2", "c3", "d4"];
        // Every subset pair of a 4-element universe.
        for active_mask in 0u8..16 {
            for desired_mask in 0u8..16 {
                let pick = |mask: u8| -> BTreeSet<Instrument> {
                    universe
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| mask & (1 << i) != 0)
                        .map(|(_, s)| Instrument::new(s).unwrap())
                        .collect()
                };
                let active = pick(active_mask);
                let desired = pick(desired_mask);
                let delta = reconcile(&active, &desired);

                assert!(delta.to_subscribe.is_disjoint(&delta.to_unsubscribe));

                let kept: BTreeSet<_> = active.intersection(&desired).cloned().collect();
                let rebuilt: BTreeSet<_> = kept.union(&delta.to_subscribe).cloned().collect();
                assert_eq!(rebuilt, desired);

                let after: BTreeSet<_> = active
                    .difference(&delta.to_unsubscribe)
                    .cloned()
                    .chain(delta.to_subscribe.iter().cloned())
                    .collect();
                assert_eq!(after, desired);
            }
        }
    }
}
