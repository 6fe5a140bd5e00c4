//! Session orchestration: wires the phase controller, outcome generator,
//! trial logger, and presentation queue behind a small event API.
//!
//! The engine is single-threaded and event-driven. Each entry point
//! (`drop_item`, `click_machine`, `advance`, `tick`) runs to completion;
//! illegal input in the current phase is a logged no-op.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::export::{ExportPayload, ExportSink};
use crate::layout::{LayoutRandomizer, SessionLayout, SlotSizeMap};
use crate::narration::{CueKind, NarrationCue, NarrationStatus, Narrator, NullNarrator};
use crate::outcome::OutcomeGenerator;
use crate::participant::ParticipantProfile;
use crate::phase::{Directive, Phase, PhaseController, DEMO_INSTRUCTIONS};
use crate::present::{NullPresentation, PresentationQueue, PresentationSink};
use crate::record::{LogContext, TrialLogger, TrialRecord};

/// Time source for reaction measurement and reveal scheduling.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Wall-clock time in milliseconds since the Unix epoch.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }
}

/// Hand-driven clock for tests and scripted replays.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Arc<AtomicU64>);

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self(Arc::new(AtomicU64::new(start_ms)))
    }

    pub fn set(&self, ms: u64) {
        self.0.store(ms, Ordering::Relaxed);
    }

    pub fn advance(&self, delta_ms: u64) {
        self.0.fetch_add(delta_ms, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// One participant's experiment session.
pub struct Session {
    id: Uuid,
    profile: ParticipantProfile,
    config: SessionConfig,
    layout: SessionLayout,
    slot_map: SlotSizeMap,
    generator: OutcomeGenerator,
    controller: PhaseController,
    logger: TrialLogger,
    queue: PresentationQueue,
    narrator: Box<dyn Narrator>,
    presentation: Box<dyn PresentationSink>,
    clock: Box<dyn Clock>,
    export_sink: Option<Box<dyn ExportSink>>,
    /// Input gate: set while a narration cue is still playing.
    narration_pending: bool,
}

impl Session {
    /// Build a session with headless collaborators. Layout randomization and
    /// outcome generation share one RNG, seeded from the config.
    pub fn new(profile: ParticipantProfile, config: SessionConfig) -> Self {
        let mut rng: Box<dyn RngCore> = match config.seed {
            Some(seed) => Box::new(StdRng::seed_from_u64(seed)),
            None => Box::new(StdRng::from_os_rng()),
        };
        let layout =
            LayoutRandomizer::new(config.slot_order_policy.clone()).generate_layout(&mut rng);
        let slot_map = SlotSizeMap::from_layout(&layout);
        let generator = OutcomeGenerator::new(rng);
        let controller = PhaseController::new(config.demo_budget(), config.exploration_budget);
        let clock: Box<dyn Clock> = Box::new(SystemClock);
        let logger = TrialLogger::new(LogContext::new(&profile, &layout), clock.now_ms());
        let queue = PresentationQueue::new(config.reveal_delay_ms, config.drop_stale_reveals);

        let id = Uuid::new_v4();
        info!(session = %id, participant = profile.id(), "session created");

        Self {
            id,
            profile,
            config,
            layout,
            slot_map,
            generator,
            controller,
            logger,
            queue,
            narrator: Box::new(NullNarrator),
            presentation: Box::new(NullPresentation),
            clock,
            export_sink: None,
            narration_pending: false,
        }
    }

    pub fn with_narrator(mut self, narrator: Box<dyn Narrator>) -> Self {
        self.narrator = narrator;
        self
    }

    pub fn with_presentation(mut self, presentation: Box<dyn PresentationSink>) -> Self {
        self.presentation = presentation;
        self
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.logger.reset_clock(clock.now_ms());
        self.clock = clock;
        self
    }

    pub fn with_export_sink(mut self, sink: Box<dyn ExportSink>) -> Self {
        self.export_sink = Some(sink);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn profile(&self) -> &ParticipantProfile {
        &self.profile
    }

    pub fn layout(&self) -> &SessionLayout {
        &self.layout
    }

    pub fn phase(&self) -> Phase {
        self.controller.phase()
    }

    pub fn is_terminal(&self) -> bool {
        self.controller.phase() == Phase::Terminal
    }

    pub fn remaining_budget(&self) -> u32 {
        self.controller.remaining_budget()
    }

    pub fn awaiting_explanation(&self) -> bool {
        self.controller.awaiting_explanation()
    }

    pub fn records(&self) -> &[TrialRecord] {
        &self.logger.records()[..]
    }

    /// Show the opening instructions and play the introduction cue.
    pub fn begin(&mut self) {
        self.presentation.show_instruction(DEMO_INSTRUCTIONS);
        self.narrate(NarrationCue::new(Phase::Demo, CueKind::Introduction));
    }

    /// Run the scripted demo: every slot of every machine receives the
    /// configured number of drops, left to right. Each outcome is narrated.
    pub fn run_demo(&mut self) {
        if self.controller.phase() != Phase::Demo {
            warn!(phase = self.controller.phase().label(), "demo already over");
            return;
        }
        for position in 0..3 {
            for slot in 0..3 {
                for _ in 0..self.config.demo_drops_per_slot {
                    self.resolve_drop(position, slot);
                }
            }
        }
        self.narrate(NarrationCue::new(Phase::Demo, CueKind::Finish));
    }

    /// A participant drag-and-drop onto `slot` of the machine at `position`.
    /// Refused during the scripted demo and while narration is playing.
    pub fn drop_item(&mut self, position: usize, slot: usize) {
        if self.input_blocked() {
            return;
        }
        if self.controller.phase() == Phase::Demo {
            warn!("participant drops are not accepted during the demo");
            return;
        }
        self.resolve_drop(position, slot);
    }

    /// A machine click answering the current question.
    pub fn click_machine(&mut self, position: usize) {
        if self.input_blocked() {
            return;
        }
        let Some(machine) = self.layout.machine_at(position) else {
            warn!(position, "click on unknown machine position");
            return;
        };
        let Some(ticket) = self.controller.register_choice() else {
            return;
        };

        // Recall questions score the clicked machine against the machine
        // whose outcomes are being shown; other choice questions record no
        // correctness.
        let correctness = match ticket.expected_position {
            Some(expected) => {
                if self.layout.machine_at(expected) == Some(machine) {
                    "Correct"
                } else {
                    "Incorrect"
                }
            }
            None => "",
        };

        let now = self.clock.now_ms();
        let label = self.controller.phase().label();
        self.logger
            .record_choice(label, ticket.question, machine, correctness, now);
        self.execute(ticket.directives);
    }

    /// Attach a free-text explanation to the latest interaction. Blank text
    /// is ignored.
    pub fn submit_explanation(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            debug!("empty explanation ignored");
            return;
        }
        let label = self.controller.phase().label();
        self.logger.record_explanation(label, text);
    }

    /// The continue press: ask the controller for the next transition.
    pub fn advance(&mut self) {
        if self.input_blocked() {
            return;
        }
        let directives = self.controller.advance();
        self.execute(directives);
    }

    /// End the exploration free play before its budget runs out. Outside of
    /// exploration this is a logged no-op.
    pub fn finish_exploration(&mut self) {
        if self.controller.phase() != Phase::Exploration {
            warn!(
                phase = self.controller.phase().label(),
                "finish ignored outside exploration"
            );
            return;
        }
        self.advance();
    }

    /// Signal from the narration collaborator that the pending cue finished.
    pub fn narration_finished(&mut self) {
        self.narration_pending = false;
    }

    /// Deliver every deferred reveal that has come due.
    pub fn tick(&mut self) {
        let now = self.clock.now_ms();
        for reveal in self.queue.drain_due(now, self.controller.phase()) {
            self.presentation.reveal(&reveal);
        }
    }

    /// Build the export payload from the current log.
    pub fn export(&self) -> ExportPayload {
        ExportPayload::new(&self.profile, self.logger.records())
    }

    /// Operator early exit: jump to the terminal phase and export whatever
    /// was logged so far.
    pub fn finish_now(&mut self) {
        self.controller.terminate();
        self.deliver_export();
    }

    fn input_blocked(&self) -> bool {
        if self.narration_pending {
            debug!("input refused while narration is playing");
        }
        self.narration_pending
    }

    /// Compute, log, and queue one drop. The outcome is final the moment it
    /// is computed; only its reveal is deferred.
    fn resolve_drop(&mut self, position: usize, slot: usize) {
        if !self.controller.can_drop() {
            warn!(
                phase = self.controller.phase().label(),
                position, slot, "drop refused"
            );
            return;
        }
        let Some(machine) = self.layout.machine_at(position) else {
            warn!(position, "drop on unknown machine position");
            return;
        };
        let Some(slot_size) = self.slot_map.lookup(machine, slot) else {
            warn!(machine = machine.name(), slot, "drop on unknown slot");
            return;
        };

        let phase = self.controller.phase();
        let outcome = self
            .generator
            .produce(machine, slot, slot_size, phase.outcome_mode());
        let now = self.clock.now_ms();
        let handle = self.queue.schedule(phase, machine, slot, outcome, now);
        let Some(ticket) = self.controller.register_drop(position, handle) else {
            return;
        };

        if phase == Phase::Demo {
            self.logger
                .record_demo_interaction(phase.label(), machine, slot_size, &outcome);
            if let Some(size) = outcome.star_size() {
                self.narrate(NarrationCue::new(phase, CueKind::Outcome(size)));
            }
        } else {
            self.logger.record_interaction(
                phase.label(),
                ticket.trial.clone(),
                machine,
                slot_size,
                &outcome,
                now,
            );
        }
        self.execute(ticket.directives);
    }

    fn execute(&mut self, directives: Vec<Directive>) {
        for directive in directives {
            match directive {
                Directive::ResetReactionClock => {
                    self.logger.reset_clock(self.clock.now_ms());
                }
                Directive::Rerender { extra_slot } => {
                    if extra_slot && !self.layout.has_extra_slot() {
                        self.layout = self.layout.with_extra_slot();
                        self.slot_map = SlotSizeMap::from_layout(&self.layout);
                    }
                    self.presentation.rerender(&self.layout);
                }
                Directive::ClearItems(handles) => self.presentation.clear_items(&handles),
                Directive::ClearAllOutcomes => self.presentation.clear_all_outcomes(),
                Directive::Narrate(cue) => self.narrate(cue),
                Directive::ShowInstruction(text) => self.presentation.show_instruction(&text),
                Directive::ShowOutcomeGrouping { position } => {
                    self.presentation.show_outcome_grouping(position);
                }
                Directive::ShowBrightnessReference { round, target } => {
                    self.presentation.show_brightness_reference(round, target);
                }
                Directive::RevealExplanationPrompt => self.presentation.show_explanation_prompt(),
                Directive::Export => self.deliver_export(),
            }
        }
    }

    fn narrate(&mut self, cue: NarrationCue) {
        if self.narrator.play(&cue) == NarrationStatus::Pending {
            self.narration_pending = true;
        }
    }

    fn deliver_export(&mut self) {
        let payload = self.export();
        info!(
            session = %self.id,
            rows = payload.row_count(),
            "session complete, exporting"
        );
        if let Some(sink) = &mut self.export_sink {
            if let Err(error) = sink.deliver(&payload) {
                warn!(%error, "export delivery failed; log retained in memory");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::present::DeferredReveal;
    use anyhow::bail;

    fn profile() -> ParticipantProfile {
        ParticipantProfile::from_intake("p1", "9", "F").unwrap()
    }

    fn config(seed: u64) -> SessionConfig {
        SessionConfig {
            seed: Some(seed),
            ..SessionConfig::default()
        }
    }

    fn session(seed: u64) -> (Session, ManualClock) {
        let clock = ManualClock::new(1_000);
        let session =
            Session::new(profile(), config(seed)).with_clock(Box::new(clock.clone()));
        (session, clock)
    }

    #[test]
    fn test_demo_logs_scripted_drops_with_zero_reaction() {
        let (mut session, _clock) = session(7);
        session.begin();
        session.run_demo();
        assert_eq!(session.records().len(), 27);
        for record in session.records() {
            assert_eq!(record.phase, "Demo");
            assert_eq!(record.reaction_ms, Some(0));
        }
        assert_eq!(session.remaining_budget(), 0);
    }

    #[test]
    fn test_participant_drop_refused_during_demo() {
        let (mut session, _clock) = session(8);
        session.begin();
        session.drop_item(0, 0);
        assert!(session.records().is_empty());
        assert_eq!(session.remaining_budget(), 27, "budget untouched");
    }

    struct PendingNarrator;

    impl Narrator for PendingNarrator {
        fn play(&mut self, _cue: &NarrationCue) -> NarrationStatus {
            NarrationStatus::Pending
        }
    }

    #[test]
    fn test_pending_narration_gates_input_until_finished() {
        let clock = ManualClock::new(0);
        let mut session = Session::new(profile(), config(9))
            .with_clock(Box::new(clock.clone()))
            .with_narrator(Box::new(PendingNarrator));
        session.begin();
        session.run_demo();
        assert_eq!(session.phase(), Phase::Demo);

        session.advance();
        assert_eq!(session.phase(), Phase::Demo, "gated while cue plays");

        session.narration_finished();
        session.advance();
        assert_eq!(session.phase(), Phase::Comprehension);
    }

    #[derive(Default)]
    struct RevealLog(Rc<RefCell<Vec<DeferredReveal>>>);

    impl PresentationSink for RevealLog {
        fn reveal(&mut self, reveal: &DeferredReveal) {
            self.0.borrow_mut().push(*reveal);
        }
        fn rerender(&mut self, _layout: &SessionLayout) {}
        fn clear_items(&mut self, _handles: &[u64]) {}
        fn clear_all_outcomes(&mut self) {}
        fn show_instruction(&mut self, _text: &str) {}
        fn show_outcome_grouping(&mut self, _position: usize) {}
        fn show_brightness_reference(&mut self, _round: usize, _target: u8) {}
        fn show_explanation_prompt(&mut self) {}
    }

    #[test]
    fn test_reveal_deferred_until_delay_elapses() {
        let reveals = Rc::new(RefCell::new(Vec::new()));
        let clock = ManualClock::new(0);
        let mut session = Session::new(profile(), config(10))
            .with_clock(Box::new(clock.clone()))
            .with_presentation(Box::new(RevealLog(Rc::clone(&reveals))));
        session.begin();
        session.run_demo();

        session.tick();
        assert!(reveals.borrow().is_empty(), "reveal delay not yet elapsed");

        clock.advance(700);
        session.tick();
        assert_eq!(reveals.borrow().len(), 27);
    }

    #[test]
    fn test_comprehension_click_scores_correctness() {
        let (mut session, clock) = session(11);
        session.begin();
        session.run_demo();
        clock.advance(700);
        session.tick();
        session.advance();
        assert_eq!(session.phase(), Phase::Comprehension);

        // The first grouping recalls position 0; clicking it is correct.
        clock.advance(350);
        session.click_machine(0);
        let record = session.records().last().unwrap();
        assert_eq!(record.correct_machine, "Correct");
        assert_eq!(record.reaction_ms, Some(350));

        session.advance();
        clock.advance(100);
        session.click_machine(0);
        let record = session.records().last().unwrap();
        assert_eq!(record.correct_machine, "Incorrect");
    }

    #[test]
    fn test_blank_explanation_ignored() {
        let (mut session, _clock) = session(12);
        session.submit_explanation("   ");
        assert!(session.records().is_empty());
        session.submit_explanation("it made a big star");
        assert_eq!(session.records().len(), 1);
        assert!(session.records()[0].is_explanation_only());
    }

    struct FailingSink;

    impl ExportSink for FailingSink {
        fn deliver(&mut self, _payload: &ExportPayload) -> anyhow::Result<()> {
            bail!("collector unreachable")
        }
    }

    #[test]
    fn test_failed_export_keeps_log_in_memory() {
        let clock = ManualClock::new(0);
        let mut session = Session::new(profile(), config(13))
            .with_clock(Box::new(clock.clone()))
            .with_export_sink(Box::new(FailingSink));
        session.begin();
        session.run_demo();
        session.finish_now();
        assert!(session.is_terminal());
        assert_eq!(session.records().len(), 27, "records survive a failed export");
        assert_eq!(session.export().row_count(), 27);
    }

    #[test]
    fn test_finish_exploration_ignored_outside_exploration() {
        let (mut session, _clock) = session(14);
        session.begin();
        session.run_demo();
        session.finish_exploration();
        assert_eq!(session.phase(), Phase::Demo, "no early jump from the demo");
        assert!(!session.is_terminal());
    }

    #[test]
    fn test_seeded_sessions_share_layout_and_outcomes() {
        let (mut a, _) = session(42);
        let (mut b, _) = session(42);
        assert_eq!(a.layout().machine_order(), b.layout().machine_order());
        a.run_demo();
        b.run_demo();
        let stars_a: Vec<_> = a.records().iter().map(|r| r.star_size.clone()).collect();
        let stars_b: Vec<_> = b.records().iter().map(|r| r.star_size.clone()).collect();
        assert_eq!(stars_a, stars_b);
    }
}
