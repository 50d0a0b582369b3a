use std::collections::HashMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::grading::Calculator;
use crate::models::{CalculationResult, Entry, FailureReason};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasonSummary {
    pub reason: FailureReason,
    pub count: usize,
}

pub fn summarize_reasons(results: &[(&Entry, CalculationResult)]) -> Vec<ReasonSummary> {
    let mut map: HashMap<FailureReason, usize> = HashMap::new();

    for (_, result) in results {
        for reason in &result.status.reasons {
            *map.entry(*reason).or_insert(0) += 1;
        }
    }

    let mut summaries: Vec<ReasonSummary> = map
        .into_iter()
        .map(|(reason, count)| ReasonSummary { reason, count })
        .collect();

    summaries.sort_by(|a, b| b.count.cmp(&a.count).then(a.reason.cmp(&b.reason)));
    summaries
}

pub fn build_report(calculator: &Calculator, entries: &[Entry], generated_at: DateTime<Utc>) -> String {
    let mut results = Vec::new();
    let mut incomplete = Vec::new();
    let mut rejected = Vec::new();

    for entry in entries {
        if !entry.is_complete() {
            incomplete.push(entry);
            continue;
        }
        match calculator.calculate(entry) {
            Ok(result) => results.push((entry, result)),
            Err(err) => rejected.push((entry, err)),
        }
    }

    let passed = results
        .iter()
        .filter(|(_, result)| result.status.passed)
        .count();
    let summaries = summarize_reasons(&results);

    let mut output = String::new();

    let _ = writeln!(output, "# Final Assessment Report");
    let _ = writeln!(
        output,
        "Generated {} with grading scheme {}",
        generated_at.format("%Y-%m-%d %H:%M UTC"),
        calculator.scheme().version
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");
    let _ = writeln!(output, "- Entries: {}", entries.len());
    let _ = writeln!(output, "- Calculated: {}", results.len());
    let _ = writeln!(output, "- Passed: {}", passed);
    let _ = writeln!(output, "- Failed: {}", results.len() - passed);
    let _ = writeln!(output, "- Incomplete: {}", incomplete.len());

    let _ = writeln!(output);
    let _ = writeln!(output, "## Results");

    if results.is_empty() {
        let _ = writeln!(output, "No complete entries to calculate.");
    } else {
        let _ = writeln!(output, "| Name | AP1 | AP2 | Project work | Overall | Result |");
        let _ = writeln!(output, "|------|-----|-----|--------------|---------|--------|");
        for (entry, result) in &results {
            let verdict = if result.status.passed {
                "passed".to_string()
            } else {
                let codes: Vec<&str> = result.status.reasons.iter().map(|r| r.code()).collect();
                format!("failed ({})", codes.join(", "))
            };
            let _ = writeln!(
                output,
                "| {} | {} ({} P) | {} ({} P) | {} ({} P) | {} ({} P) | {} |",
                entry.name,
                result.ap1.grade,
                result.ap1.points,
                result.ap2.overall.grade,
                result.ap2.overall.points,
                result.ap2.pw.overall.grade,
                result.ap2.pw.overall.points,
                result.overall.grade,
                result.overall.points,
                verdict
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Failure Reasons");

    if summaries.is_empty() {
        let _ = writeln!(output, "No failures recorded.");
    } else {
        for summary in &summaries {
            let _ = writeln!(output, "- {}: {}", summary.reason, summary.count);
        }
    }

    if !incomplete.is_empty() || !rejected.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Not Calculated");
        for entry in &incomplete {
            let _ = writeln!(
                output,
                "- {}: missing {}",
                entry.name,
                entry.missing_fields().join(", ")
            );
        }
        for (entry, err) in &rejected {
            let _ = writeln!(output, "- {}: {}", entry.name, err);
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Ap2Part, Ap2Scores, ProjectWork, Score};
    use uuid::Uuid;

    fn entry(name: &str, ap1: Option<Score>, mains: [Score; 3], pw: [Score; 2]) -> Entry {
        let now = Utc::now();
        let part = |main| Ap2Part {
            main: Some(main),
            extra: None,
        };
        Entry {
            id: Uuid::new_v4(),
            name: name.to_string(),
            ap1,
            ap2: Ap2Scores {
                planning: part(mains[0]),
                development: part(mains[1]),
                economy: part(mains[2]),
            },
            pw: ProjectWork {
                project: Some(pw[0]),
                presentation: Some(pw[1]),
            },
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn reasons_are_counted_across_entries() {
        let calculator = Calculator::default();
        let weak_ap1 = entry("A", Some(10), [85, 85, 85], [90, 90]);
        let weak_all = entry("B", Some(20), [20, 20, 20], [20, 20]);
        let results = vec![
            (&weak_ap1, calculator.calculate(&weak_ap1).expect("complete")),
            (&weak_all, calculator.calculate(&weak_all).expect("complete")),
        ];

        let summaries = summarize_reasons(&results);
        assert_eq!(
            summaries[0],
            ReasonSummary {
                reason: FailureReason::Ap1Failed,
                count: 2
            }
        );
        assert_eq!(summaries.len(), 8);
    }

    #[test]
    fn report_lists_results_and_gaps() {
        let calculator = Calculator::default();
        let mut extras = entry("Jules Moreno", Some(92), [85, 85, 85], [90, 90]);
        extras.ap2.planning.extra = Some(70);
        extras.ap2.economy.extra = Some(70);
        let entries = vec![
            entry("Avery Lee", Some(92), [85, 85, 85], [90, 90]),
            entry("Kiara Patel", None, [85, 85, 85], [90, 90]),
            entry("Sam Ortiz", Some(10), [85, 85, 85], [90, 90]),
            extras,
        ];

        let report = build_report(&calculator, &entries, Utc::now());

        assert!(report.contains("# Final Assessment Report"));
        assert!(report.contains("grading scheme ihk-2020"));
        assert!(report.contains("- Passed: 1"));
        assert!(report.contains("- Failed: 1"));
        assert!(report.contains("| Avery Lee | 1 (92 P) | 2 (85 P) | 2 (90 P) | 2 (89 P) | passed |"));
        assert!(report.contains("failed (ap1_failed)"));
        assert!(report.contains("- ap1_failed: 1"));
        assert!(report.contains("- Kiara Patel: missing ap1"));
        assert!(report.contains("- Jules Moreno: only one supplementary exam"));
    }

    #[test]
    fn empty_report_says_so() {
        let report = build_report(&Calculator::default(), &[], Utc::now());
        assert!(report.contains("No complete entries to calculate."));
        assert!(report.contains("No failures recorded."));
        assert!(!report.contains("## Not Calculated"));
    }
}
