//! Per-session layout randomization: machine order, colors, and slot sizes.
//!
//! The layout is generated exactly once per session and is read-only
//! afterward; every trial record embeds the same serialized layout so data
//! stays comparable across phases. Introducing the transient fourth slot
//! copies the existing assignment rather than re-randomizing it.

use std::collections::BTreeMap;
use std::fmt;

use rand::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::SlotOrderPolicy;

/// The three machine identities. Fixed at compile time; used as lookup keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Machine {
    Exploiter,
    Empowerment,
    Entropy,
}

impl Machine {
    pub const ALL: [Machine; 3] = [Machine::Exploiter, Machine::Empowerment, Machine::Entropy];

    pub fn name(self) -> &'static str {
        match self {
            Machine::Exploiter => "Exploiter",
            Machine::Empowerment => "Empowerment",
            Machine::Entropy => "Entropy",
        }
    }
}

impl fmt::Display for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Display colors assigned to machine positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineColor {
    Blue,
    Green,
    Purple,
}

impl MachineColor {
    pub const ALL: [MachineColor; 3] =
        [MachineColor::Blue, MachineColor::Green, MachineColor::Purple];

    pub fn name(self) -> &'static str {
        match self {
            MachineColor::Blue => "Blue",
            MachineColor::Green => "Green",
            MachineColor::Purple => "Purple",
        }
    }
}

/// Slot size tags. Also the star outcome sizes; `ExtraSmall` appears only on
/// the transient fourth slot and as an Empowerment outcome there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotSize {
    ExtraSmall,
    Small,
    Medium,
    Large,
}

impl SlotSize {
    /// Single-letter export code.
    pub fn code(self) -> &'static str {
        match self {
            SlotSize::ExtraSmall => "E",
            SlotSize::Small => "S",
            SlotSize::Medium => "M",
            SlotSize::Large => "L",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SlotSize::ExtraSmall => "extrasmall",
            SlotSize::Small => "small",
            SlotSize::Medium => "medium",
            SlotSize::Large => "large",
        }
    }

    /// Monotonic brightness mapping used by the Empowerment machine.
    pub fn brightness(self) -> u8 {
        match self {
            SlotSize::ExtraSmall => 1,
            SlotSize::Small => 2,
            SlotSize::Medium => 3,
            SlotSize::Large => 4,
        }
    }
}

impl fmt::Display for SlotSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Star sizes the Entropy machine draws from.
pub const STAR_SIZES: [SlotSize; 3] = [SlotSize::Small, SlotSize::Medium, SlotSize::Large];

/// The pinned ordering used by deployed sessions: large, medium, small.
pub const DEFAULT_SLOT_ORDER: [SlotSize; 3] = [SlotSize::Large, SlotSize::Medium, SlotSize::Small];

/// Orderings permitted when sampling instead of pinning.
pub const PERMITTED_SLOT_ORDERS: [[SlotSize; 3]; 4] = [
    [SlotSize::Small, SlotSize::Large, SlotSize::Medium],
    [SlotSize::Large, SlotSize::Small, SlotSize::Medium],
    [SlotSize::Medium, SlotSize::Small, SlotSize::Large],
    [SlotSize::Medium, SlotSize::Large, SlotSize::Small],
];

/// The frozen per-session layout: machine and color permutations plus the
/// slot-size ordering for the three base slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLayout {
    machine_order: [Machine; 3],
    color_order: [MachineColor; 3],
    slot_order: [SlotSize; 3],
    extra_slot: bool,
}

impl SessionLayout {
    pub fn machine_order(&self) -> &[Machine; 3] {
        &self.machine_order
    }

    /// Machine at a display position (0 = leftmost).
    pub fn machine_at(&self, position: usize) -> Option<Machine> {
        self.machine_order.get(position).copied()
    }

    /// Display position of a machine.
    pub fn position_of(&self, machine: Machine) -> usize {
        self.machine_order
            .iter()
            .position(|&m| m == machine)
            .unwrap_or(0)
    }

    pub fn has_extra_slot(&self) -> bool {
        self.extra_slot
    }

    /// Number of slots per machine (3, or 4 once the extra slot is in play).
    pub fn slot_count(&self) -> usize {
        if self.extra_slot {
            4
        } else {
            3
        }
    }

    /// Assigned size of a slot index, if that slot exists right now.
    pub fn slot_size(&self, slot: usize) -> Option<SlotSize> {
        match slot {
            0..=2 => Some(self.slot_order[slot]),
            3 if self.extra_slot => Some(SlotSize::ExtraSmall),
            _ => None,
        }
    }

    /// Copy of this layout with the fourth slot enabled. The base three-slot
    /// assignment is preserved by copy, never re-randomized.
    pub fn with_extra_slot(&self) -> SessionLayout {
        SessionLayout {
            extra_slot: true,
            ..self.clone()
        }
    }

    /// Layout string recorded in every trial: `"Entropy, Exploiter, Empowerment"`.
    pub fn machine_label(&self) -> String {
        self.machine_order
            .iter()
            .map(|m| m.name())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Color string recorded in every trial: `"Blue, Green, Purple"`.
    pub fn color_label(&self) -> String {
        self.color_order
            .iter()
            .map(|c| c.name())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Slot-size string recorded in every trial, base slots only: `"LMS"`.
    pub fn slot_label(&self) -> String {
        self.slot_order.iter().map(|s| s.code()).collect()
    }
}

/// Frozen lookup from machine and slot index to slot size, derived from the
/// layout. Every machine shares the same slot ordering.
#[derive(Debug, Clone)]
pub struct SlotSizeMap {
    sizes: BTreeMap<Machine, Vec<SlotSize>>,
}

impl SlotSizeMap {
    pub fn from_layout(layout: &SessionLayout) -> Self {
        let mut sizes = BTreeMap::new();
        for machine in Machine::ALL {
            let per_slot: Vec<SlotSize> = (0..layout.slot_count())
                .filter_map(|slot| layout.slot_size(slot))
                .collect();
            sizes.insert(machine, per_slot);
        }
        Self { sizes }
    }

    pub fn lookup(&self, machine: Machine, slot: usize) -> Option<SlotSize> {
        self.sizes.get(&machine).and_then(|s| s.get(slot)).copied()
    }
}

/// Produces the per-session random layout.
pub struct LayoutRandomizer {
    policy: SlotOrderPolicy,
}

impl LayoutRandomizer {
    pub fn new(policy: SlotOrderPolicy) -> Self {
        Self { policy }
    }

    /// Generate the session layout: uniform machine and color permutations,
    /// slot ordering per policy. Called once per session under normal flow.
    pub fn generate_layout(&self, rng: &mut (impl Rng + ?Sized)) -> SessionLayout {
        let mut machine_order = Machine::ALL;
        machine_order.shuffle(rng);

        let mut color_order = MachineColor::ALL;
        color_order.shuffle(rng);

        let slot_order = match &self.policy {
            SlotOrderPolicy::Fixed(order) => *order,
            SlotOrderPolicy::Sampled => *PERMITTED_SLOT_ORDERS
                .choose(rng)
                .expect("permitted orderings pool is non-empty"),
        };

        SessionLayout {
            machine_order,
            color_order,
            slot_order,
            extra_slot: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;

    fn seeded(seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }

    #[test]
    fn test_fixed_policy_pins_slot_order() {
        let randomizer = LayoutRandomizer::new(SlotOrderPolicy::Fixed(DEFAULT_SLOT_ORDER));
        let layout = randomizer.generate_layout(&mut seeded(1));
        assert_eq!(layout.slot_size(0), Some(SlotSize::Large));
        assert_eq!(layout.slot_size(1), Some(SlotSize::Medium));
        assert_eq!(layout.slot_size(2), Some(SlotSize::Small));
        assert_eq!(layout.slot_label(), "LMS");
    }

    #[test]
    fn test_sampled_policy_stays_in_pool() {
        let randomizer = LayoutRandomizer::new(SlotOrderPolicy::Sampled);
        for seed in 0..50 {
            let layout = randomizer.generate_layout(&mut seeded(seed));
            let order = [
                layout.slot_size(0).unwrap(),
                layout.slot_size(1).unwrap(),
                layout.slot_size(2).unwrap(),
            ];
            assert!(
                PERMITTED_SLOT_ORDERS.contains(&order),
                "sampled order {:?} not in permitted pool",
                order
            );
        }
    }

    #[test]
    fn test_machine_order_is_a_permutation() {
        let randomizer = LayoutRandomizer::new(SlotOrderPolicy::Fixed(DEFAULT_SLOT_ORDER));
        for seed in 0..20 {
            let layout = randomizer.generate_layout(&mut seeded(seed));
            for machine in Machine::ALL {
                assert_eq!(
                    layout.machine_at(layout.position_of(machine)),
                    Some(machine)
                );
            }
        }
    }

    #[test]
    fn test_different_seeds_vary_machine_order() {
        let randomizer = LayoutRandomizer::new(SlotOrderPolicy::Fixed(DEFAULT_SLOT_ORDER));
        let orders: Vec<_> = (0..10)
            .map(|seed| *randomizer.generate_layout(&mut seeded(seed)).machine_order())
            .collect();
        let first = orders[0];
        assert!(
            orders.iter().any(|o| *o != first),
            "10 seeds should not all produce the same machine order"
        );
    }

    #[test]
    fn test_extra_slot_copy_preserves_base_assignment() {
        let randomizer = LayoutRandomizer::new(SlotOrderPolicy::Fixed(DEFAULT_SLOT_ORDER));
        let base = randomizer.generate_layout(&mut seeded(7));
        let extended = base.with_extra_slot();

        assert!(!base.has_extra_slot());
        assert!(extended.has_extra_slot());
        assert_eq!(extended.slot_count(), 4);
        assert_eq!(extended.slot_size(3), Some(SlotSize::ExtraSmall));
        for slot in 0..3 {
            assert_eq!(extended.slot_size(slot), base.slot_size(slot));
        }
        assert_eq!(extended.machine_order(), base.machine_order());
        assert_eq!(extended.slot_label(), base.slot_label());
    }

    #[test]
    fn test_missing_slot_lookup_is_none() {
        let randomizer = LayoutRandomizer::new(SlotOrderPolicy::Fixed(DEFAULT_SLOT_ORDER));
        let layout = randomizer.generate_layout(&mut seeded(3));
        assert_eq!(layout.slot_size(3), None);
        assert_eq!(layout.slot_size(9), None);
    }

    #[test]
    fn test_slot_size_map_mirrors_layout() {
        let randomizer = LayoutRandomizer::new(SlotOrderPolicy::Sampled);
        let layout = randomizer.generate_layout(&mut seeded(11)).with_extra_slot();
        let map = SlotSizeMap::from_layout(&layout);
        for machine in Machine::ALL {
            for slot in 0..4 {
                assert_eq!(map.lookup(machine, slot), layout.slot_size(slot));
            }
            assert_eq!(map.lookup(machine, 4), None);
        }
    }

    #[test]
    fn test_labels_match_recorded_format() {
        let randomizer = LayoutRandomizer::new(SlotOrderPolicy::Fixed(DEFAULT_SLOT_ORDER));
        let layout = randomizer.generate_layout(&mut seeded(5));
        let machines = layout.machine_label();
        assert_eq!(machines.matches(", ").count(), 2);
        for machine in Machine::ALL {
            assert!(machines.contains(machine.name()));
        }
        let colors = layout.color_label();
        for color in MachineColor::ALL {
            assert!(colors.contains(color.name()));
        }
    }
}
