//! Outcome generation: the per-machine rules that turn a drop into a star
//! size or a brightness level.
//!
//! Exploiter and Empowerment are deterministic. Entropy is stochastic with
//! two constraints on the three base slots:
//! - first-use rule: the first outcome at a slot never matches the slot's
//!   assigned size
//! - anti-triple rule: the third outcome at a slot never equals both of the
//!   first two (bounded rejection sampling; history is capped at three)
//!
//! Brightness-mode Entropy ignores both constraints. The transient fourth
//! slot is exempt from both.

use rand::prelude::*;

use crate::layout::{Machine, SlotSize, STAR_SIZES};

/// Which outcome family the current phase produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeMode {
    /// Star sizes (item-collection phases).
    Star,
    /// Brightness levels 1..=4 (the lightness phase).
    Brightness,
}

/// A produced outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Star(SlotSize),
    Brightness(u8),
}

impl Outcome {
    /// Export code: single letter for stars, the digit for brightness.
    pub fn code(&self) -> String {
        match self {
            Outcome::Star(size) => size.code().to_string(),
            Outcome::Brightness(level) => level.to_string(),
        }
    }

    pub fn star_size(&self) -> Option<SlotSize> {
        match self {
            Outcome::Star(size) => Some(*size),
            Outcome::Brightness(_) => None,
        }
    }
}

/// Per-slot Entropy history. Lives for the whole session and is never reset;
/// only the generator mutates it.
#[derive(Debug, Clone)]
pub struct EntropyState {
    first_round: [bool; 3],
    recent: [Vec<SlotSize>; 3],
}

impl EntropyState {
    fn new() -> Self {
        Self {
            first_round: [true; 3],
            recent: [Vec::new(), Vec::new(), Vec::new()],
        }
    }

    /// Whether the first-use rule still applies at a base slot.
    pub fn first_round_pending(&self, slot: usize) -> bool {
        self.first_round.get(slot).copied().unwrap_or(false)
    }

    /// Recorded outcomes at a base slot (at most three).
    pub fn history(&self, slot: usize) -> &[SlotSize] {
        self.recent.get(slot).map(Vec::as_slice).unwrap_or(&[])
    }

    fn note(&mut self, slot: usize, size: SlotSize) {
        if let Some(history) = self.recent.get_mut(slot) {
            if history.len() < 3 {
                history.push(size);
            }
        }
    }
}

/// Generates outcomes according to each machine's rule, owning the session
/// RNG and the Entropy history.
pub struct OutcomeGenerator {
    entropy: EntropyState,
    rng: Box<dyn RngCore>,
}

impl OutcomeGenerator {
    pub fn new(rng: Box<dyn RngCore>) -> Self {
        Self {
            entropy: EntropyState::new(),
            rng,
        }
    }

    /// Convenience constructor in the seeded-or-random pattern.
    pub fn from_seed(seed: Option<u64>) -> Self {
        let rng: Box<dyn RngCore> = match seed {
            Some(seed) => Box::new(StdRng::seed_from_u64(seed)),
            None => Box::new(StdRng::from_os_rng()),
        };
        Self::new(rng)
    }

    pub fn entropy_state(&self) -> &EntropyState {
        &self.entropy
    }

    /// Produce the outcome for a drop. `slot_size` is the slot's assigned
    /// size from the frozen layout. Sampling always terminates: at most one
    /// of the three star sizes is excluded at any constrained step.
    pub fn produce(
        &mut self,
        machine: Machine,
        slot: usize,
        slot_size: SlotSize,
        mode: OutcomeMode,
    ) -> Outcome {
        match mode {
            OutcomeMode::Star => Outcome::Star(match machine {
                Machine::Exploiter => SlotSize::Medium,
                Machine::Empowerment => slot_size,
                Machine::Entropy => self.entropy_star(slot, slot_size),
            }),
            OutcomeMode::Brightness => Outcome::Brightness(match machine {
                Machine::Exploiter => 3,
                Machine::Empowerment => slot_size.brightness(),
                Machine::Entropy => self.rng.random_range(1..=4),
            }),
        }
    }

    fn entropy_star(&mut self, slot: usize, slot_size: SlotSize) -> SlotSize {
        let base_slot = slot < 3;

        let mut size = if base_slot && self.entropy.first_round_pending(slot) {
            self.entropy.first_round[slot] = false;
            random_size_not_matching(&mut self.rng, slot_size)
        } else {
            random_star_size(&mut self.rng)
        };

        if base_slot {
            let history = self.entropy.history(slot);
            if history.len() == 2 {
                let (first, second) = (history[0], history[1]);
                while size == first && size == second {
                    size = random_star_size(&mut self.rng);
                }
            }
            self.entropy.note(slot, size);
        }

        size
    }
}

fn random_star_size(rng: &mut (impl Rng + ?Sized)) -> SlotSize {
    *STAR_SIZES.choose(rng).expect("star sizes are non-empty")
}

/// Uniform draw over the two star sizes that do not match the slot's size.
fn random_size_not_matching(rng: &mut (impl Rng + ?Sized), slot_size: SlotSize) -> SlotSize {
    let candidates: Vec<SlotSize> = STAR_SIZES
        .iter()
        .copied()
        .filter(|&s| s != slot_size)
        .collect();
    *candidates
        .choose(rng)
        .expect("at least two sizes never match the slot")
}
