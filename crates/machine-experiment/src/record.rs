//! Trial logging: one structured record per interaction or choice event.
//!
//! Records are append-only. The only post-hoc mutation is performed by the
//! exporter, which folds explanation-only records backward; the logger
//! itself appends them as same-shaped records to keep ordering simple.

use serde::{Deserialize, Serialize};

use crate::layout::{Machine, SessionLayout, SlotSize};
use crate::outcome::Outcome;
use crate::participant::ParticipantProfile;

/// Trial identifier: a per-phase counter, the question text, or empty
/// (scripted demo drops and explanation records).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialTag {
    Number(u32),
    Text(String),
    Empty,
}

impl TrialTag {
    pub fn render(&self) -> String {
        match self {
            TrialTag::Number(n) => n.to_string(),
            TrialTag::Text(text) => text.clone(),
            TrialTag::Empty => String::new(),
        }
    }
}

/// One logged unit of interaction data. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub participant_id: String,
    pub age: String,
    pub sex: String,
    pub machine_order: String,
    pub slot_layout: String,
    pub color_order: String,
    pub phase: String,
    pub trial: TrialTag,
    pub machine: String,
    pub slot_size: String,
    pub star_size: String,
    pub reaction_ms: Option<u64>,
    pub correct_machine: String,
    pub explanation: String,
}

impl TrialRecord {
    /// An explanation-only record carries free text and no machine/outcome
    /// data; the exporter folds it into the preceding row.
    pub fn is_explanation_only(&self) -> bool {
        !self.explanation.trim().is_empty() && self.machine.is_empty() && self.star_size.is_empty()
    }
}

/// Participant and layout fields frozen at session start and stamped into
/// every record, so layout metadata can never vary within a session.
#[derive(Debug, Clone)]
pub struct LogContext {
    participant_id: String,
    age: String,
    sex: String,
    machine_order: String,
    slot_layout: String,
    color_order: String,
}

impl LogContext {
    pub fn new(profile: &ParticipantProfile, layout: &SessionLayout) -> Self {
        Self {
            participant_id: profile.id().to_string(),
            age: profile.age().to_string(),
            sex: profile.sex().as_str().to_string(),
            machine_order: layout.machine_label(),
            slot_layout: layout.slot_label(),
            color_order: layout.color_label(),
        }
    }
}

/// Appends trial records and owns the reaction-time clock.
///
/// Reaction time is the elapsed ms since the previous interaction timestamp;
/// the clock resets immediately after each capture and on every
/// phase-continue press.
#[derive(Debug)]
pub struct TrialLogger {
    context: LogContext,
    records: Vec<TrialRecord>,
    last_event_ms: u64,
}

impl TrialLogger {
    pub fn new(context: LogContext, now_ms: u64) -> Self {
        Self {
            context,
            records: Vec::new(),
            last_event_ms: now_ms,
        }
    }

    pub fn records(&self) -> &[TrialRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Reset the reaction clock (phase start / continue press).
    pub fn reset_clock(&mut self, now_ms: u64) {
        self.last_event_ms = now_ms;
    }

    fn sample_reaction(&mut self, now_ms: u64) -> u64 {
        let elapsed = now_ms.saturating_sub(self.last_event_ms);
        self.last_event_ms = now_ms;
        elapsed
    }

    fn base_record(&self, phase_label: &str) -> TrialRecord {
        TrialRecord {
            participant_id: self.context.participant_id.clone(),
            age: self.context.age.clone(),
            sex: self.context.sex.clone(),
            machine_order: self.context.machine_order.clone(),
            slot_layout: self.context.slot_layout.clone(),
            color_order: self.context.color_order.clone(),
            phase: phase_label.to_string(),
            trial: TrialTag::Empty,
            machine: String::new(),
            slot_size: String::new(),
            star_size: String::new(),
            reaction_ms: None,
            correct_machine: String::new(),
            explanation: String::new(),
        }
    }

    /// Record a drop interaction, sampling the reaction clock.
    pub fn record_interaction(
        &mut self,
        phase_label: &str,
        trial: TrialTag,
        machine: Machine,
        slot_size: SlotSize,
        outcome: &Outcome,
        now_ms: u64,
    ) {
        let reaction = self.sample_reaction(now_ms);
        self.push_interaction(phase_label, trial, machine, slot_size, outcome, reaction);
    }

    /// Record a scripted demo drop: reaction time is zero and the clock is
    /// left untouched.
    pub fn record_demo_interaction(
        &mut self,
        phase_label: &str,
        machine: Machine,
        slot_size: SlotSize,
        outcome: &Outcome,
    ) {
        self.push_interaction(phase_label, TrialTag::Empty, machine, slot_size, outcome, 0);
    }

    fn push_interaction(
        &mut self,
        phase_label: &str,
        trial: TrialTag,
        machine: Machine,
        slot_size: SlotSize,
        outcome: &Outcome,
        reaction_ms: u64,
    ) {
        let mut record = self.base_record(phase_label);
        record.trial = trial;
        record.machine = machine.name().to_string();
        record.slot_size = slot_size.code().to_string();
        record.star_size = outcome.code();
        record.reaction_ms = Some(reaction_ms);
        self.records.push(record);
    }

    /// Record a machine-click choice. `correctness` is `"Correct"` /
    /// `"Incorrect"` for recall questions and empty elsewhere.
    pub fn record_choice(
        &mut self,
        phase_label: &str,
        question: &str,
        machine: Machine,
        correctness: &str,
        now_ms: u64,
    ) {
        let reaction = self.sample_reaction(now_ms);
        let mut record = self.base_record(phase_label);
        record.trial = TrialTag::Text(question.to_string());
        record.machine = machine.name().to_string();
        record.reaction_ms = Some(reaction);
        record.correct_machine = correctness.to_string();
        self.records.push(record);
    }

    /// Record a free-text explanation as a same-shaped record; the exporter
    /// folds it into the preceding row.
    pub fn record_explanation(&mut self, phase_label: &str, text: &str) {
        let mut record = self.base_record(phase_label);
        record.explanation = text.to_string();
        self.records.push(record);
    }
}
