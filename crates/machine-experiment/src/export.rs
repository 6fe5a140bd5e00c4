//! Export formatting: the fixed tabular layout sent to the remote collector.
//!
//! Walks the trial log in insertion order, folding explanation-only records
//! into the preceding emitted row. Sessions with no interactions still emit
//! one row carrying the participant identity.

use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::participant::ParticipantProfile;
use crate::record::TrialRecord;

/// Fixed column order of the export table.
pub const EXPORT_HEADER: [&str; 14] = [
    "Prolific ID",
    "Age",
    "Sex",
    "Machine Order (L->R)",
    "Slot Layout Order (L->R)",
    "Color Order (L->R)",
    "Phase",
    "Trial",
    "Machine",
    "Slot Size",
    "Star Type",
    "Reaction Time (ms)",
    "Correct Machine",
    "Explanation",
];

/// Collapse the trial log into `[header, ...data_rows]`.
pub fn to_table(profile: &ParticipantProfile, records: &[TrialRecord]) -> Vec<Vec<String>> {
    let mut table = Vec::with_capacity(records.len() + 1);
    table.push(EXPORT_HEADER.iter().map(|h| h.to_string()).collect());

    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in records {
        if record.is_explanation_only() {
            match rows.last_mut() {
                Some(previous) => previous[13] = record.explanation.clone(),
                None => tracing::debug!("explanation with no preceding row, dropped"),
            }
            continue;
        }
        rows.push(record_row(record));
    }

    if rows.is_empty() {
        let mut row = vec![
            profile.id().to_string(),
            profile.age().to_string(),
            profile.sex().as_str().to_string(),
        ];
        row.extend(std::iter::repeat_n(String::new(), EXPORT_HEADER.len() - 3));
        rows.push(row);
    }

    table.extend(rows);
    table
}

fn record_row(record: &TrialRecord) -> Vec<String> {
    vec![
        record.participant_id.clone(),
        record.age.clone(),
        record.sex.clone(),
        record.machine_order.clone(),
        record.slot_layout.clone(),
        record.color_order.clone(),
        record.phase.clone(),
        record.trial.render(),
        record.machine.clone(),
        record.slot_size.clone(),
        record.star_size.clone(),
        record
            .reaction_ms
            .map(|ms| ms.to_string())
            .unwrap_or_default(),
        record.correct_machine.clone(),
        record.explanation.clone(),
    ]
}

/// The JSON payload sent once at session end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportPayload {
    #[serde(rename = "participantID")]
    pub participant_id: String,
    pub data: Vec<Vec<String>>,
}

impl ExportPayload {
    pub fn new(profile: &ParticipantProfile, records: &[TrialRecord]) -> Self {
        Self {
            participant_id: profile.id().to_string(),
            data: to_table(profile, records),
        }
    }

    /// Number of data rows (excluding the header).
    pub fn row_count(&self) -> usize {
        self.data.len().saturating_sub(1)
    }

    /// Save the payload to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a payload from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let payload = serde_json::from_str(&json)?;
        Ok(payload)
    }
}

/// The remote collector seam. Transport failures are surfaced with their raw
/// error text and never retried automatically; the log stays in memory so
/// export can be re-attempted.
pub trait ExportSink {
    fn deliver(&mut self, payload: &ExportPayload) -> Result<()>;
}

/// Sink that writes the payload to a local file.
#[derive(Debug)]
pub struct FileSink {
    path: std::path::PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ExportSink for FileSink {
    fn deliver(&mut self, payload: &ExportPayload) -> Result<()> {
        payload.save(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SlotOrderPolicy;
    use crate::layout::{LayoutRandomizer, Machine, SlotSize, DEFAULT_SLOT_ORDER};
    use crate::outcome::Outcome;
    use crate::record::{LogContext, TrialLogger, TrialTag};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn profile() -> ParticipantProfile {
        ParticipantProfile::from_intake("p1", "9", "M").unwrap()
    }

    fn logger(profile: &ParticipantProfile) -> TrialLogger {
        let layout = LayoutRandomizer::new(SlotOrderPolicy::Fixed(DEFAULT_SLOT_ORDER))
            .generate_layout(&mut StdRng::seed_from_u64(1));
        TrialLogger::new(LogContext::new(profile, &layout), 0)
    }

    #[test]
    fn test_empty_log_emits_identity_row() {
        let profile = profile();
        let table = to_table(&profile, &[]);
        assert_eq!(table.len(), 2, "header plus one identity row");
        let row = &table[1];
        assert_eq!(row.len(), 14);
        assert_eq!(&row[..3], &["p1", "9", "M"]);
        assert!(row[3..].iter().all(|cell| cell.is_empty()));
    }

    #[test]
    fn test_explanation_folds_into_preceding_row() {
        let profile = profile();
        let mut logger = logger(&profile);
        logger.record_interaction(
            "Question",
            TrialTag::Number(1),
            Machine::Entropy,
            SlotSize::Large,
            &Outcome::Star(SlotSize::Small),
            100,
        );
        logger.record_explanation("Question", "I wanted a small one");
        logger.record_interaction(
            "Question",
            TrialTag::Number(2),
            Machine::Exploiter,
            SlotSize::Medium,
            &Outcome::Star(SlotSize::Medium),
            200,
        );

        let table = to_table(&profile, logger.records());
        // Header + 2 interaction rows; explanation row folded away.
        assert_eq!(table.len(), 3);
        assert_eq!(table[1][13], "I wanted a small one");
        assert_eq!(table[2][13], "");
    }

    #[test]
    fn test_row_count_matches_records_minus_explanations() {
        let profile = profile();
        let mut logger = logger(&profile);
        for trial in 1..=4 {
            logger.record_interaction(
                "Question",
                TrialTag::Number(trial),
                Machine::Empowerment,
                SlotSize::Small,
                &Outcome::Star(SlotSize::Small),
                trial as u64 * 100,
            );
        }
        logger.record_explanation("Question", "first note");
        logger.record_explanation("Question", "second note");

        let payload = ExportPayload::new(&profile, logger.records());
        assert_eq!(payload.row_count(), 4);
        // Later fold overwrites the earlier one on the same row.
        assert_eq!(payload.data[4][13], "second note");
    }

    #[test]
    fn test_header_row_is_fixed() {
        let profile = profile();
        let table = to_table(&profile, &[]);
        assert_eq!(table[0], EXPORT_HEADER.to_vec());
    }

    #[test]
    fn test_choice_row_renders_question_text() {
        let profile = profile();
        let mut logger = logger(&profile);
        logger.record_choice(
            "Comprehension",
            "Which machine made these stars?",
            Machine::Entropy,
            "Incorrect",
            50,
        );
        let table = to_table(&profile, logger.records());
        let row = &table[1];
        assert_eq!(row[7], "Which machine made these stars?");
        assert_eq!(row[8], "Entropy");
        assert_eq!(row[9], "");
        assert_eq!(row[12], "Incorrect");
    }

    #[test]
    fn test_payload_save_and_load_round_trip() {
        let profile = profile();
        let mut logger = logger(&profile);
        logger.record_interaction(
            "Exploration",
            TrialTag::Number(1),
            Machine::Entropy,
            SlotSize::Large,
            &Outcome::Star(SlotSize::Medium),
            100,
        );
        let payload = ExportPayload::new(&profile, logger.records());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        payload.save(&path).unwrap();
        let loaded = ExportPayload::load(&path).unwrap();
        assert_eq!(loaded, payload);
        assert_eq!(loaded.participant_id, "p1");
    }
}
