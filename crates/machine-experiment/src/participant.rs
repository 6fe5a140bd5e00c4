//! Participant intake: validation of raw form fields into an immutable profile.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Participant sex, normalized to uppercase at intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    F,
    M,
}

impl Sex {
    pub fn as_str(self) -> &'static str {
        match self {
            Sex::F => "F",
            Sex::M => "M",
        }
    }
}

impl std::fmt::Display for Sex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation failures at intake. All are recoverable by re-entry; the
/// messages are shown to the operator verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntakeError {
    #[error("Please fill out all fields.")]
    MissingField,
    #[error("Please enter a valid age.")]
    InvalidAge,
    #[error("Please enter F or M for sex.")]
    InvalidSex,
}

/// An accepted participant. Created once at intake and immutable afterward;
/// the engine refuses to start a session without one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantProfile {
    id: String,
    age: u8,
    sex: Sex,
}

impl ParticipantProfile {
    /// Validate three raw intake strings into a profile.
    ///
    /// Fields are trimmed; sex is matched case-insensitively and stored
    /// uppercase; age must parse as an integer in 1..=120.
    pub fn from_intake(id: &str, age: &str, sex: &str) -> Result<Self, IntakeError> {
        let id = id.trim();
        let age = age.trim();
        let sex = sex.trim().to_uppercase();

        if id.is_empty() || age.is_empty() || sex.is_empty() {
            return Err(IntakeError::MissingField);
        }

        let age: u8 = age.parse().map_err(|_| IntakeError::InvalidAge)?;
        if !(1..=120).contains(&age) {
            return Err(IntakeError::InvalidAge);
        }

        let sex = match sex.as_str() {
            "F" => Sex::F,
            "M" => Sex::M,
            _ => return Err(IntakeError::InvalidSex),
        };

        Ok(Self {
            id: id.to_string(),
            age,
            sex,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn age(&self) -> u8 {
        self.age
    }

    pub fn sex(&self) -> Sex {
        self.sex
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_and_normalizes_lowercase_sex() {
        let profile = ParticipantProfile::from_intake("abc", "10", "f").unwrap();
        assert_eq!(profile.id(), "abc");
        assert_eq!(profile.age(), 10);
        assert_eq!(profile.sex(), Sex::F);
        assert_eq!(profile.sex().as_str(), "F");
    }

    #[test]
    fn test_trims_whitespace() {
        let profile = ParticipantProfile::from_intake(" p1 ", " 9 ", " m ").unwrap();
        assert_eq!(profile.id(), "p1");
        assert_eq!(profile.age(), 9);
        assert_eq!(profile.sex(), Sex::M);
    }

    #[test]
    fn test_rejects_blank_fields() {
        assert_eq!(
            ParticipantProfile::from_intake("", "10", "F"),
            Err(IntakeError::MissingField)
        );
        assert_eq!(
            ParticipantProfile::from_intake("abc", "  ", "F"),
            Err(IntakeError::MissingField)
        );
        assert_eq!(
            ParticipantProfile::from_intake("abc", "10", ""),
            Err(IntakeError::MissingField)
        );
    }

    #[test]
    fn test_rejects_bad_age() {
        for age in ["zero", "0", "121", "-3", "9.5"] {
            assert_eq!(
                ParticipantProfile::from_intake("abc", age, "F"),
                Err(IntakeError::InvalidAge),
                "age {:?} should be rejected",
                age
            );
        }
    }

    #[test]
    fn test_rejects_bad_sex() {
        assert_eq!(
            ParticipantProfile::from_intake("abc", "10", "X"),
            Err(IntakeError::InvalidSex)
        );
        assert_eq!(
            ParticipantProfile::from_intake("abc", "10", "female"),
            Err(IntakeError::InvalidSex)
        );
    }

    #[test]
    fn test_boundary_ages_accepted() {
        assert!(ParticipantProfile::from_intake("abc", "1", "F").is_ok());
        assert!(ParticipantProfile::from_intake("abc", "120", "M").is_ok());
    }
}
