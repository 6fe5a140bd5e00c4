//! Narration cue interface for the external audio collaborator.
//!
//! The engine emits symbolic cues; the collaborator maps them to media
//! assets. While a cue is pending, phase-advancing input is refused until
//! completion is signalled back to the session.

use crate::layout::SlotSize;
use crate::phase::Phase;

/// What a cue narrates, within its phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CueKind {
    /// Opening instructions (demo phase).
    Introduction,
    /// End of the scripted demo tour.
    Finish,
    /// A produced star size.
    Outcome(SlotSize),
    /// The phase's standing prompt.
    Prompt,
    /// The fourth-slot follow-up prompt inside the extrasmall phase.
    FollowUp,
    /// A numbered round or question within the phase.
    Round(usize),
}

/// A symbolic narration cue: phase plus what to narrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NarrationCue {
    pub phase: Phase,
    pub kind: CueKind,
}

impl NarrationCue {
    pub fn new(phase: Phase, kind: CueKind) -> Self {
        Self { phase, kind }
    }
}

/// Whether playback finished synchronously or the engine must wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NarrationStatus {
    Completed,
    Pending,
}

/// The audio collaborator seam. Implementations returning `Pending` must
/// later call `Session::narration_finished` to release the input gate.
pub trait Narrator {
    fn play(&mut self, cue: &NarrationCue) -> NarrationStatus;
}

/// Headless narrator: logs the cue and completes immediately.
#[derive(Debug, Default)]
pub struct NullNarrator;

impl Narrator for NullNarrator {
    fn play(&mut self, cue: &NarrationCue) -> NarrationStatus {
        tracing::debug!(phase = cue.phase.label(), kind = ?cue.kind, "narration cue");
        NarrationStatus::Completed
    }
}
