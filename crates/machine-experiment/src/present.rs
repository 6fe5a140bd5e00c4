//! Deferred outcome presentation, decoupled from outcome computation.
//!
//! Computation is synchronous and logged immediately; the visual reveal is
//! queued with a phase stamp and a due time. Stale reveals (phase changed
//! while the delay ran) are dropped by default rather than applied to the
//! wrong phase's display.

use crate::layout::{Machine, SessionLayout};
use crate::outcome::Outcome;
use crate::phase::Phase;

/// A computed outcome waiting for its visual reveal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeferredReveal {
    /// Handle for later clearing of the revealed item.
    pub handle: u64,
    /// Phase at computation time; reveals are stale once this differs from
    /// the current phase.
    pub phase: Phase,
    pub machine: Machine,
    pub slot: usize,
    pub outcome: Outcome,
    /// Time at which the reveal becomes due (ms).
    pub due_ms: u64,
}

/// Queue of pending reveals with the fixed post-drop delay.
#[derive(Debug)]
pub struct PresentationQueue {
    pending: Vec<DeferredReveal>,
    delay_ms: u64,
    drop_stale: bool,
    next_handle: u64,
}

impl PresentationQueue {
    pub fn new(delay_ms: u64, drop_stale: bool) -> Self {
        Self {
            pending: Vec::new(),
            delay_ms,
            drop_stale,
            next_handle: 1,
        }
    }

    /// Queue a reveal for an outcome computed now; returns its handle.
    pub fn schedule(
        &mut self,
        phase: Phase,
        machine: Machine,
        slot: usize,
        outcome: Outcome,
        now_ms: u64,
    ) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.pending.push(DeferredReveal {
            handle,
            phase,
            machine,
            slot,
            outcome,
            due_ms: now_ms + self.delay_ms,
        });
        handle
    }

    /// Pop every reveal that is due. Stale reveals are dropped, or delivered
    /// with the staleness window logged when the queue is configured to be
    /// permissive.
    pub fn drain_due(&mut self, now_ms: u64, current: Phase) -> Vec<DeferredReveal> {
        let mut due = Vec::new();
        self.pending.retain(|reveal| {
            if reveal.due_ms > now_ms {
                return true;
            }
            if reveal.phase != current {
                if self.drop_stale {
                    tracing::debug!(
                        stamped = reveal.phase.label(),
                        current = current.label(),
                        "dropping stale deferred reveal"
                    );
                    return false;
                }
                tracing::debug!(
                    stamped = reveal.phase.label(),
                    current = current.label(),
                    "delivering stale deferred reveal"
                );
            }
            due.push(*reveal);
            false
        });
        due
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// The rendering collaborator seam. A missing or inert implementation
/// degrades each call to a no-op; it never affects engine state.
pub trait PresentationSink {
    fn reveal(&mut self, reveal: &DeferredReveal);
    fn rerender(&mut self, layout: &SessionLayout);
    fn clear_items(&mut self, handles: &[u64]);
    fn clear_all_outcomes(&mut self);
    fn show_instruction(&mut self, text: &str);
    fn show_outcome_grouping(&mut self, position: usize);
    fn show_brightness_reference(&mut self, round: usize, target: u8);
    fn show_explanation_prompt(&mut self);
}

/// Headless presentation: logs at debug level and does nothing.
#[derive(Debug, Default)]
pub struct NullPresentation;

impl PresentationSink for NullPresentation {
    fn reveal(&mut self, reveal: &DeferredReveal) {
        tracing::debug!(
            machine = reveal.machine.name(),
            slot = reveal.slot,
            outcome = %reveal.outcome.code(),
            "reveal"
        );
    }

    fn rerender(&mut self, layout: &SessionLayout) {
        tracing::debug!(slots = layout.slot_count(), "rerender");
    }

    fn clear_items(&mut self, handles: &[u64]) {
        tracing::debug!(count = handles.len(), "clear items");
    }

    fn clear_all_outcomes(&mut self) {
        tracing::debug!("clear all outcomes");
    }

    fn show_instruction(&mut self, text: &str) {
        tracing::debug!(text, "instruction");
    }

    fn show_outcome_grouping(&mut self, position: usize) {
        tracing::debug!(position, "show outcome grouping");
    }

    fn show_brightness_reference(&mut self, round: usize, target: u8) {
        tracing::debug!(round, target, "brightness reference");
    }

    fn show_explanation_prompt(&mut self) {
        tracing::debug!("explanation prompt");
    }
}
