use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Raw exam points on the 0..=100 scale.
pub type Score = u32;

/// German school grade, 1 (best) to 6 (worst).
pub type Grade = u8;

pub const MAX_SCORE: Score = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ap2Part {
    pub main: Option<Score>,
    /// Supplementary oral exam ("Zusatzprüfung").
    pub extra: Option<Score>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ap2Scores {
    pub planning: Ap2Part,
    pub development: Ap2Part,
    pub economy: Ap2Part,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectWork {
    #[serde(alias = "ML2")]
    pub project: Option<Score>,
    #[serde(alias = "ML1")]
    pub presentation: Option<Score>,
}

/// Request body for saving or updating an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryInput {
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(alias = "AP1")]
    pub ap1: Option<Score>,
    #[serde(alias = "AP2")]
    pub ap2: Ap2Scores,
    #[serde(alias = "PW", alias = "ml", alias = "ML")]
    pub pw: ProjectWork,
}

impl EntryInput {
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in score_fields(self.ap1, &self.ap2, &self.pw) {
            if let Some(value) = value {
                if value > MAX_SCORE {
                    return Err(ValidationError::OutOfRange { field, value });
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: Uuid,
    pub name: String,
    pub ap1: Option<Score>,
    pub ap2: Ap2Scores,
    pub pw: ProjectWork,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entry {
    /// Required scores that are still absent, named by their form keys.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let required = [
            ("ap1", self.ap1),
            ("ap2.planning.main", self.ap2.planning.main),
            ("ap2.development.main", self.ap2.development.main),
            ("ap2.economy.main", self.ap2.economy.main),
            ("pw.project", self.pw.project),
            ("pw.presentation", self.pw.presentation),
        ];

        required
            .into_iter()
            .filter(|(_, value)| value.is_none())
            .map(|(field, _)| field)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    pub fn score_fields(&self) -> [(&'static str, Option<Score>); 9] {
        score_fields(self.ap1, &self.ap2, &self.pw)
    }
}

fn score_fields(
    ap1: Option<Score>,
    ap2: &Ap2Scores,
    pw: &ProjectWork,
) -> [(&'static str, Option<Score>); 9] {
    [
        ("ap1", ap1),
        ("ap2.planning.main", ap2.planning.main),
        ("ap2.planning.extra", ap2.planning.extra),
        ("ap2.development.main", ap2.development.main),
        ("ap2.development.extra", ap2.development.extra),
        ("ap2.economy.main", ap2.economy.main),
        ("ap2.economy.extra", ap2.economy.extra),
        ("pw.project", pw.project),
        ("pw.presentation", pw.presentation),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeAndPoints {
    pub points: Score,
    pub grade: Grade,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectWorkResult {
    pub project: GradeAndPoints,
    pub presentation: GradeAndPoints,
    pub overall: GradeAndPoints,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ap2Result {
    pub planning: GradeAndPoints,
    pub development: GradeAndPoints,
    pub economy: GradeAndPoints,
    pub pw: ProjectWorkResult,
    pub overall: GradeAndPoints,
}

/// Machine-readable failure codes; clients translate them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Ap1Failed,
    Ap2PlanningFailed,
    Ap2DevelopmentFailed,
    Ap2EconomyFailed,
    PwFailed,
    Ap2InsufficientAreas,
    Ap2OverallFailed,
    OverallFailed,
}

impl FailureReason {
    pub fn code(self) -> &'static str {
        match self {
            FailureReason::Ap1Failed => "ap1_failed",
            FailureReason::Ap2PlanningFailed => "ap2_planning_failed",
            FailureReason::Ap2DevelopmentFailed => "ap2_development_failed",
            FailureReason::Ap2EconomyFailed => "ap2_economy_failed",
            FailureReason::PwFailed => "pw_failed",
            FailureReason::Ap2InsufficientAreas => "ap2_insufficient_areas",
            FailureReason::Ap2OverallFailed => "ap2_overall_failed",
            FailureReason::OverallFailed => "overall_failed",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub passed: bool,
    pub reasons: Vec<FailureReason>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationResult {
    #[serde(rename = "AP1")]
    pub ap1: GradeAndPoints,
    #[serde(rename = "AP2")]
    pub ap2: Ap2Result,
    #[serde(rename = "Overall")]
    pub overall: GradeAndPoints,
    #[serde(rename = "Status")]
    pub status: Status,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_accepts_payload_spelling() {
        let payload = r#"{
            "Name": "Avery Lee",
            "AP1": 85,
            "AP2": {
                "planning": {"main": 90},
                "development": {"main": 88, "extra": 92},
                "economy": {"main": 78, "extra": null}
            },
            "PW": {"project": 95, "presentation": 98}
        }"#;

        let input: EntryInput = serde_json::from_str(payload).expect("payload parses");
        assert_eq!(input.name, "Avery Lee");
        assert_eq!(input.ap1, Some(85));
        assert_eq!(input.ap2.development.extra, Some(92));
        assert_eq!(input.ap2.economy.extra, None);
        assert_eq!(input.pw.presentation, Some(98));
    }

    #[test]
    fn input_accepts_oral_exam_spelling() {
        let input: EntryInput =
            serde_json::from_str(r#"{"Name": "Jules", "ml": {"ML1": 92, "ML2": 88}}"#)
                .expect("payload parses");
        assert_eq!(input.pw.presentation, Some(92));
        assert_eq!(input.pw.project, Some(88));
    }

    #[test]
    fn input_defaults_missing_sections() {
        let input: EntryInput = serde_json::from_str(r#"{"name": "Jules"}"#).expect("parses");
        assert_eq!(input.ap1, None);
        assert_eq!(input.ap2, Ap2Scores::default());
        assert_eq!(input.pw, ProjectWork::default());
    }

    #[test]
    fn negative_scores_are_rejected_by_the_type() {
        let parsed = serde_json::from_str::<EntryInput>(r#"{"AP1": -5}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn validate_rejects_scores_above_hundred() {
        let input = EntryInput {
            ap1: Some(101),
            ..EntryInput::default()
        };
        let err = input.validate().unwrap_err();
        assert_eq!(
            err,
            ValidationError::OutOfRange {
                field: "ap1",
                value: 101
            }
        );
    }

    #[test]
    fn missing_fields_lists_required_scores_only() {
        let now = Utc::now();
        let entry = Entry {
            id: Uuid::new_v4(),
            name: "Kiara".to_string(),
            ap1: Some(70),
            ap2: Ap2Scores {
                planning: Ap2Part {
                    main: Some(60),
                    extra: None,
                },
                ..Ap2Scores::default()
            },
            pw: ProjectWork {
                project: Some(80),
                presentation: None,
            },
            created_at: now,
            updated_at: now,
        };

        assert_eq!(
            entry.missing_fields(),
            vec!["ap2.development.main", "ap2.economy.main", "pw.presentation"]
        );
        assert!(!entry.is_complete());
    }

    #[test]
    fn result_serializes_with_display_keys() {
        let gp = GradeAndPoints {
            points: 90,
            grade: 2,
        };
        let result = CalculationResult {
            ap1: gp,
            ap2: Ap2Result {
                planning: gp,
                development: gp,
                economy: gp,
                pw: ProjectWorkResult {
                    project: gp,
                    presentation: gp,
                    overall: gp,
                },
                overall: gp,
            },
            overall: gp,
            status: Status {
                passed: false,
                reasons: vec![FailureReason::Ap1Failed],
            },
        };

        let value = serde_json::to_value(&result).expect("serializes");
        assert_eq!(value["AP1"]["grade"], 2);
        assert_eq!(value["AP2"]["pw"]["overall"]["points"], 90);
        assert_eq!(value["Overall"]["points"], 90);
        assert_eq!(value["Status"]["reasons"][0], "ap1_failed");
    }
}
