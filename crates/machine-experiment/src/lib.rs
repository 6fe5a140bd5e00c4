//! Trial and phase engine for the three-machines behavioral experiment.
//!
//! A child interacts with three machines (Exploiter, Empowerment, Entropy),
//! each producing size or brightness outcomes from a small typed rule set,
//! while the engine:
//! - advances through a fixed forward-only sequence of experiment phases
//! - randomizes machine/color/slot layout once per participant
//! - enforces the Entropy machine's anti-repetition constraints
//! - records every interaction for later analysis and tabular export
//!
//! Rendering, gesture capture, audio narration, and the remote upload are
//! external collaborators reached through traits; the engine itself is
//! single-threaded and event-driven.

pub mod config;
pub mod export;
pub mod layout;
pub mod narration;
pub mod outcome;
pub mod participant;
pub mod phase;
pub mod present;
pub mod record;
pub mod session;
