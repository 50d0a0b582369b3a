//! Points-to-grade conversion and pass/fail verdicts for AP1, AP2 and
//! the company project work.
//!
//! Everything here is pure: a [`Calculator`] owns a validated
//! [`GradingScheme`] and maps an [`Entry`] to a [`CalculationResult`]
//! without touching storage.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CalculationError, SchemeError};
use crate::models::{
    Ap2Part, Ap2Result, CalculationResult, Entry, FailureReason, Grade, GradeAndPoints,
    ProjectWorkResult, Score, Status, MAX_SCORE,
};

const BEST_GRADE: Grade = 1;
const WORST_GRADE: Grade = 6;

/// Planning, development, economy and project work.
const AP2_AREAS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeBand {
    pub min_points: Score,
    pub max_points: Score,
    pub grade: Grade,
}

/// Integer weights; only their ratios matter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Weights {
    pub ap1: u32,
    pub planning: u32,
    pub development: u32,
    pub economy: u32,
    pub project: u32,
    pub presentation: u32,
}

/// How a supplementary oral exam combines with the written result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplementaryRule {
    pub main_weight: u32,
    pub extra_weight: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassRules {
    /// Worst grade that still counts as "ausreichend".
    pub max_passing_grade: Grade,
    /// A single area at or beyond this grade fails the exam outright.
    pub failing_grade: Grade,
    /// AP2 areas (planning, development, economy, project work) that
    /// must reach `max_passing_grade`.
    pub min_passing_areas: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradingScheme {
    pub version: String,
    pub bands: Vec<GradeBand>,
    pub weights: Weights,
    pub supplementary: SupplementaryRule,
    pub pass: PassRules,
}

impl Default for GradingScheme {
    fn default() -> Self {
        let band = |min_points, max_points, grade| GradeBand {
            min_points,
            max_points,
            grade,
        };

        Self {
            version: "ihk-2020".to_string(),
            bands: vec![
                band(92, 100, 1),
                band(81, 91, 2),
                band(67, 80, 3),
                band(50, 66, 4),
                band(30, 49, 5),
                band(0, 29, 6),
            ],
            weights: Weights {
                ap1: 20,
                planning: 10,
                development: 10,
                economy: 10,
                project: 25,
                presentation: 25,
            },
            supplementary: SupplementaryRule {
                main_weight: 2,
                extra_weight: 1,
            },
            pass: PassRules {
                max_passing_grade: 4,
                failing_grade: 6,
                min_passing_areas: 3,
            },
        }
    }
}

impl GradingScheme {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read grading scheme {}", path.display()))?;
        let scheme: GradingScheme = serde_json::from_str(&raw)
            .with_context(|| format!("invalid grading scheme in {}", path.display()))?;
        scheme
            .validate()
            .with_context(|| format!("unusable grading scheme in {}", path.display()))?;
        Ok(scheme)
    }

    pub fn validate(&self) -> Result<(), SchemeError> {
        if self.bands.is_empty() {
            return Err(SchemeError::NoBands);
        }

        let mut sorted = self.bands.clone();
        sorted.sort_by_key(|band| band.min_points);

        for band in &sorted {
            if band.min_points > band.max_points {
                return Err(SchemeError::InvertedBand {
                    min: band.min_points,
                    max: band.max_points,
                });
            }
            if band.max_points > MAX_SCORE {
                return Err(SchemeError::DoesNotEndAtHundred(band.max_points));
            }
            if !(BEST_GRADE..=WORST_GRADE).contains(&band.grade) {
                return Err(SchemeError::GradeOutOfRange(band.grade));
            }
        }

        let first = sorted[0];
        if first.min_points != 0 {
            return Err(SchemeError::DoesNotStartAtZero(first.min_points));
        }
        let last = sorted[sorted.len() - 1];
        if last.max_points != MAX_SCORE {
            return Err(SchemeError::DoesNotEndAtHundred(last.max_points));
        }

        for pair in sorted.windows(2) {
            let (lower, higher) = (pair[0], pair[1]);
            if higher.min_points != lower.max_points + 1 {
                return Err(SchemeError::Discontinuous {
                    previous_max: lower.max_points,
                    next_min: higher.min_points,
                });
            }
            if higher.grade > lower.grade {
                return Err(SchemeError::NotMonotone {
                    higher: higher.grade,
                    lower: lower.grade,
                });
            }
        }

        let w = &self.weights;
        if weight_sum(&[w.planning, w.development, w.economy]) == 0 {
            return Err(SchemeError::ZeroWeight("ap2"));
        }
        if weight_sum(&[w.project, w.presentation]) == 0 {
            return Err(SchemeError::ZeroWeight("pw"));
        }
        let rule = &self.supplementary;
        if weight_sum(&[rule.main_weight, rule.extra_weight]) == 0 {
            return Err(SchemeError::ZeroSupplementaryWeight);
        }

        self.pass.validate()
    }
}

impl PassRules {
    fn validate(&self) -> Result<(), SchemeError> {
        if !(BEST_GRADE..WORST_GRADE).contains(&self.max_passing_grade) {
            return Err(SchemeError::InconsistentPassRules(
                "max_passing_grade must be between 1 and 5",
            ));
        }
        if self.failing_grade <= self.max_passing_grade || self.failing_grade > WORST_GRADE {
            return Err(SchemeError::InconsistentPassRules(
                "failing_grade must be worse than max_passing_grade and at most 6",
            ));
        }
        if self.min_passing_areas > AP2_AREAS {
            return Err(SchemeError::InconsistentPassRules(
                "min_passing_areas cannot exceed the 4 AP2 areas",
            ));
        }
        Ok(())
    }
}

fn weight_sum(weights: &[u32]) -> u64 {
    weights.iter().map(|&weight| u64::from(weight)).sum()
}

/// Weighted mean of `(weight, points)` pairs, rounded half up.
///
/// Pairs with zero weight are ignored; callers guarantee a non-zero total.
pub fn weighted_points(pairs: &[(u32, Score)]) -> Score {
    let (sum, total) = pairs
        .iter()
        .fold((0u64, 0u64), |(sum, total), &(weight, points)| {
            (sum + u64::from(weight) * u64::from(points), total + u64::from(weight))
        });

    if total == 0 {
        return 0;
    }

    // floor(sum / total + 1/2) without leaving integers
    ((2 * sum + total) / (2 * total)) as Score
}

#[derive(Debug, Clone)]
pub struct Calculator {
    scheme: GradingScheme,
}

impl Calculator {
    pub fn new(scheme: GradingScheme) -> Result<Self, SchemeError> {
        scheme.validate()?;
        Ok(Self { scheme })
    }

    pub fn scheme(&self) -> &GradingScheme {
        &self.scheme
    }

    pub fn grade_for(&self, points: Score) -> Grade {
        self.scheme
            .bands
            .iter()
            .find(|band| (band.min_points..=band.max_points).contains(&points))
            .map(|band| band.grade)
            .unwrap_or_else(|| self.worst_grade())
    }

    fn worst_grade(&self) -> Grade {
        self.scheme
            .bands
            .iter()
            .map(|band| band.grade)
            .max()
            .unwrap_or(WORST_GRADE)
    }

    fn grade_and_points(&self, points: Score) -> GradeAndPoints {
        GradeAndPoints {
            points,
            grade: self.grade_for(points),
        }
    }

    /// Effective points of an AP2 part. A supplementary exam is mixed in
    /// by the scheme's ratio but never lowers the written result.
    pub fn resolve_part(&self, main: Score, extra: Option<Score>) -> Score {
        let Some(extra) = extra else {
            return main;
        };

        let rule = self.scheme.supplementary;
        let combined = weighted_points(&[(rule.main_weight, main), (rule.extra_weight, extra)]);
        combined.max(main)
    }

    pub fn calculate(&self, entry: &Entry) -> Result<CalculationResult, CalculationError> {
        let missing = entry.missing_fields();
        if !missing.is_empty() {
            return Err(CalculationError::MissingInput { fields: missing });
        }

        for (field, value) in entry.score_fields() {
            if let Some(value) = value {
                if value > MAX_SCORE {
                    return Err(CalculationError::OutOfRange { field, value });
                }
            }
        }

        let extras: Vec<&'static str> = [
            ("ap2.planning.extra", entry.ap2.planning.extra),
            ("ap2.development.extra", entry.ap2.development.extra),
            ("ap2.economy.extra", entry.ap2.economy.extra),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_some())
        .map(|(field, _)| field)
        .collect();
        if extras.len() > 1 {
            return Err(CalculationError::AmbiguousExtra { fields: extras });
        }

        let scores = RequiredScores::from_entry(entry)?;
        let w = self.scheme.weights;

        let planning = self.resolve_part(scores.planning, entry.ap2.planning.extra);
        let development = self.resolve_part(scores.development, entry.ap2.development.extra);
        let economy = self.resolve_part(scores.economy, entry.ap2.economy.extra);

        let ap2_overall = weighted_points(&[
            (w.planning, planning),
            (w.development, development),
            (w.economy, economy),
        ]);
        let pw_overall = weighted_points(&[
            (w.project, scores.project),
            (w.presentation, scores.presentation),
        ]);
        let overall = weighted_points(&[
            (w.ap1, scores.ap1),
            (w.planning, planning),
            (w.development, development),
            (w.economy, economy),
            (w.project, scores.project),
            (w.presentation, scores.presentation),
        ]);

        debug!(
            entry_id = %entry.id,
            planning,
            development,
            economy,
            ap2_overall,
            pw_overall,
            overall,
            "resolved component points"
        );

        let ap2 = Ap2Result {
            planning: self.grade_and_points(planning),
            development: self.grade_and_points(development),
            economy: self.grade_and_points(economy),
            pw: ProjectWorkResult {
                project: self.grade_and_points(scores.project),
                presentation: self.grade_and_points(scores.presentation),
                overall: self.grade_and_points(pw_overall),
            },
            overall: self.grade_and_points(ap2_overall),
        };
        let ap1 = self.grade_and_points(scores.ap1);
        let overall = self.grade_and_points(overall);
        let status = self.verdict(&ap1, &ap2, &overall);

        Ok(CalculationResult {
            ap1,
            ap2,
            overall,
            status,
        })
    }

    fn verdict(&self, ap1: &GradeAndPoints, ap2: &Ap2Result, overall: &GradeAndPoints) -> Status {
        let rules = self.scheme.pass;
        let mut reasons = Vec::new();

        if ap1.grade >= rules.failing_grade {
            reasons.push(FailureReason::Ap1Failed);
        }

        let areas = [
            (ap2.planning, FailureReason::Ap2PlanningFailed),
            (ap2.development, FailureReason::Ap2DevelopmentFailed),
            (ap2.economy, FailureReason::Ap2EconomyFailed),
            (ap2.pw.overall, FailureReason::PwFailed),
        ];
        for (area, reason) in areas {
            if area.grade >= rules.failing_grade {
                reasons.push(reason);
            }
        }

        let passing_areas = areas
            .iter()
            .filter(|(area, _)| area.grade <= rules.max_passing_grade)
            .count();
        if passing_areas < rules.min_passing_areas {
            reasons.push(FailureReason::Ap2InsufficientAreas);
        }

        if ap2.overall.grade > rules.max_passing_grade {
            reasons.push(FailureReason::Ap2OverallFailed);
        }
        if overall.grade > rules.max_passing_grade {
            reasons.push(FailureReason::OverallFailed);
        }

        Status {
            passed: reasons.is_empty(),
            reasons,
        }
    }
}

impl Default for Calculator {
    fn default() -> Self {
        Self {
            scheme: GradingScheme::default(),
        }
    }
}

/// Required scores once presence has been checked.
struct RequiredScores {
    ap1: Score,
    planning: Score,
    development: Score,
    economy: Score,
    project: Score,
    presentation: Score,
}

impl RequiredScores {
    fn from_entry(entry: &Entry) -> Result<Self, CalculationError> {
        let require = |field: &'static str, value: Option<Score>| {
            value.ok_or(CalculationError::MissingInput {
                fields: vec![field],
            })
        };
        let main = |field: &'static str, part: &Ap2Part| require(field, part.main);

        Ok(Self {
            ap1: require("ap1", entry.ap1)?,
            planning: main("ap2.planning.main", &entry.ap2.planning)?,
            development: main("ap2.development.main", &entry.ap2.development)?,
            economy: main("ap2.economy.main", &entry.ap2.economy)?,
            project: require("pw.project", entry.pw.project)?,
            presentation: require("pw.presentation", entry.pw.presentation)?,
        })
    }
}
