//! Session configuration: slot ordering policy, seeding, and pacing.

use serde::{Deserialize, Serialize};

use crate::layout::{SlotSize, DEFAULT_SLOT_ORDER};

/// How the slot-size ordering for the three base slots is chosen.
///
/// The study materials define a pool of permitted orderings but the deployed
/// sessions pinned a single one; both behaviors are kept selectable so a
/// protocol change is a configuration edit, not a code edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotOrderPolicy {
    /// Use this exact ordering for every session.
    Fixed([SlotSize; 3]),
    /// Sample uniformly from the permitted orderings pool.
    Sampled,
}

/// Configuration for one experiment session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Slot-size ordering policy for the three base slots
    pub slot_order_policy: SlotOrderPolicy,

    /// Random seed for reproducibility (None for random)
    pub seed: Option<u64>,

    /// Delay between outcome computation and its visual reveal (milliseconds)
    pub reveal_delay_ms: u64,

    /// Drop deferred reveals whose phase stamp no longer matches the current
    /// phase. When false, stale reveals are delivered and the staleness
    /// window is logged instead.
    pub drop_stale_reveals: bool,

    /// Scripted demo drops per slot (the demo tours every slot of every
    /// machine this many times)
    pub demo_drops_per_slot: u32,

    /// Item budget for the free-play exploration phase
    pub exploration_budget: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            slot_order_policy: SlotOrderPolicy::Fixed(DEFAULT_SLOT_ORDER),
            seed: None,
            reveal_delay_ms: 700,
            drop_stale_reveals: true,
            demo_drops_per_slot: 3,
            exploration_budget: 2,
        }
    }
}

impl SessionConfig {
    /// Total scripted drops in the demo: three machines, three slots each.
    pub fn demo_budget(&self) -> u32 {
        9 * self.demo_drops_per_slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::SlotSize;

    #[test]
    fn test_default_pins_large_medium_small() {
        let config = SessionConfig::default();
        assert_eq!(
            config.slot_order_policy,
            SlotOrderPolicy::Fixed([SlotSize::Large, SlotSize::Medium, SlotSize::Small])
        );
    }

    #[test]
    fn test_default_demo_budget_is_27() {
        assert_eq!(SessionConfig::default().demo_budget(), 27);
    }
}
