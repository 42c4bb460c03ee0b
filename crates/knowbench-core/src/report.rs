//! Aggregation over a result ledger.
//!
//! Accuracy everywhere is `Correct` rows over all rows in the group, so
//! `Scoring Error` rows lower accuracy just like `Incorrect` ones.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use knowbench_ledger::{Outcome, ResultRecord};

use crate::driver::RunSummary;

const TOP_COMBINATIONS: usize = 5;
const RULE: &str =
    "======================================================================";

/// Correct / total counter for one group of rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub correct: usize,
    pub total: usize,
}

impl Tally {
    fn add(&mut self, outcome: Outcome) {
        self.total += 1;
        if outcome.is_correct() {
            self.correct += 1;
        }
    }

    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }

    fn render(&self) -> String {
        format!(
            "{:6.1}% ({}/{})",
            self.accuracy() * 100.0,
            self.correct,
            self.total
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LedgerTotals {
    /// Distinct task ids.
    pub unique_tasks: usize,
    pub rows: usize,
    pub models: usize,
    pub temperatures: usize,
    pub domains: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelRow {
    pub model: String,
    #[serde(flatten)]
    pub tally: Tally,
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemperatureRow {
    pub temperature: f64,
    #[serde(flatten)]
    pub tally: Tally,
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinationRow {
    pub model: String,
    pub temperature: f64,
    #[serde(flatten)]
    pub tally: Tally,
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainRow {
    pub model: String,
    pub domain: String,
    #[serde(flatten)]
    pub tally: Tally,
    pub accuracy: f64,
}

/// Summary of every row in a ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerReport {
    pub totals: LedgerTotals,
    /// Best model first.
    pub by_model: Vec<ModelRow>,
    /// Coldest temperature first.
    pub by_temperature: Vec<TemperatureRow>,
    /// Up to five best (model, temperature) pairs.
    pub top_combinations: Vec<CombinationRow>,
    /// Per model, then per domain, both alphabetical.
    pub by_domain: Vec<DomainRow>,
}

impl LedgerReport {
    pub fn from_records(records: &[ResultRecord]) -> Self {
        let mut tasks = BTreeSet::new();
        let mut domains = BTreeSet::new();
        let mut models: BTreeMap<&str, Tally> = BTreeMap::new();
        let mut temperatures: Vec<(f64, Tally)> = Vec::new();
        let mut combos: Vec<(&str, f64, Tally)> = Vec::new();
        let mut model_domains: BTreeMap<(&str, &str), Tally> = BTreeMap::new();

        for r in records {
            tasks.insert(r.task_id.as_str());
            domains.insert(r.domain.as_str());
            models.entry(r.model_name.as_str()).or_default().add(r.result);
            model_domains
                .entry((r.model_name.as_str(), r.domain.as_str()))
                .or_default()
                .add(r.result);

            match temperatures.iter_mut().find(|(t, _)| *t == r.temperature) {
                Some((_, tally)) => tally.add(r.result),
                None => {
                    let mut tally = Tally::default();
                    tally.add(r.result);
                    temperatures.push((r.temperature, tally));
                }
            }

            match combos
                .iter_mut()
                .find(|(m, t, _)| *m == r.model_name && *t == r.temperature)
            {
                Some((_, _, tally)) => tally.add(r.result),
                None => {
                    let mut tally = Tally::default();
                    tally.add(r.result);
                    combos.push((r.model_name.as_str(), r.temperature, tally));
                }
            }
        }

        let totals = LedgerTotals {
            unique_tasks: tasks.len(),
            rows: records.len(),
            models: models.len(),
            temperatures: temperatures.len(),
            domains: domains.len(),
        };

        let mut by_model: Vec<ModelRow> = models
            .into_iter()
            .map(|(model, tally)| ModelRow {
                model: model.to_string(),
                tally,
                accuracy: tally.accuracy(),
            })
            .collect();
        by_model.sort_by(|a, b| b.accuracy.total_cmp(&a.accuracy));

        temperatures.sort_by(|a, b| a.0.total_cmp(&b.0));
        let by_temperature = temperatures
            .into_iter()
            .map(|(temperature, tally)| TemperatureRow {
                temperature,
                tally,
                accuracy: tally.accuracy(),
            })
            .collect();

        combos.sort_by(|a, b| {
            b.2.accuracy()
                .total_cmp(&a.2.accuracy())
                .then_with(|| a.0.cmp(b.0))
                .then_with(|| a.1.total_cmp(&b.1))
        });
        let top_combinations = combos
            .into_iter()
            .take(TOP_COMBINATIONS)
            .map(|(model, temperature, tally)| CombinationRow {
                model: model.to_string(),
                temperature,
                tally,
                accuracy: tally.accuracy(),
            })
            .collect();

        let by_domain = model_domains
            .into_iter()
            .map(|((model, domain), tally)| DomainRow {
                model: model.to_string(),
                domain: domain.to_string(),
                tally,
                accuracy: tally.accuracy(),
            })
            .collect();

        Self {
            totals,
            by_model,
            by_temperature,
            top_combinations,
            by_domain,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.totals.rows == 0
    }

    /// Console rendering. The temperature table only appears when more than
    /// one temperature was run; the combination table only when both more
    /// than one model and more than one temperature were run.
    pub fn render_text(&self) -> String {
        if self.is_empty() {
            return "No results recorded.".to_string();
        }

        let t = &self.totals;
        let mut out = String::new();
        out.push_str(RULE);
        out.push_str("\nKNOWLEDGE BENCHMARK RESULTS\n");
        out.push_str(RULE);
        out.push('\n');
        out.push_str(&format!("Benchmark items evaluated: {}\n", t.unique_tasks));
        out.push_str(&format!("Total test runs: {}\n", t.rows));
        out.push_str(&format!("Models tested: {}\n", t.models));
        out.push_str(&format!("Temperature settings: {}\n", t.temperatures));
        out.push_str(&format!("Knowledge domains: {}\n", t.domains));

        out.push_str("\nACCURACY BY MODEL:\n");
        out.push_str(&"-".repeat(40));
        out.push('\n');
        for row in &self.by_model {
            out.push_str(&format!("{:30} {}\n", row.model, row.tally.render()));
        }

        if t.temperatures > 1 {
            out.push_str("\nACCURACY BY TEMPERATURE:\n");
            out.push_str(&"-".repeat(40));
            out.push('\n');
            for row in &self.by_temperature {
                out.push_str(&format!(
                    "Temperature {:4.1}:        {}\n",
                    row.temperature,
                    row.tally.render()
                ));
            }
        }

        if t.temperatures > 1 && t.models > 1 {
            out.push_str("\nBEST MODEL-TEMPERATURE COMBINATIONS:\n");
            out.push_str(&"-".repeat(50));
            out.push('\n');
            for row in &self.top_combinations {
                out.push_str(&format!(
                    "{} (T={}): {}\n",
                    row.model,
                    row.temperature,
                    row.tally.render()
                ));
            }
        }

        out.push_str("\nACCURACY BY MODEL AND DOMAIN:\n");
        out.push_str(&"-".repeat(50));
        out.push('\n');
        for row in &self.by_domain {
            out.push_str(&format!(
                "{:30} {:20} {}\n",
                row.model,
                row.domain,
                row.tally.render()
            ));
        }
        out.push_str(RULE);
        out
    }
}

impl RunSummary {
    /// Rebuild a summary for one configuration from ledger rows.
    ///
    /// The ledger does not record why an answer was wrong, so
    /// `answer_failures` and `skipped` are always zero here.
    pub fn from_records(model: &str, temperature: f64, records: &[ResultRecord]) -> Self {
        let mut summary = RunSummary::new(model, temperature);
        for r in records.iter().filter(|r| r.matches_config(model, temperature)) {
            summary.count(r.result);
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(model: &str, temperature: f64, task: &str, domain: &str, result: Outcome) -> ResultRecord {
        ResultRecord::new(model, temperature, task, domain, result)
    }

    fn sample() -> Vec<ResultRecord> {
        vec![
            row("gemma3:4b", 0.1, "t1", "syntax", Outcome::Correct),
            row("gemma3:4b", 0.1, "t2", "panel", Outcome::Incorrect),
            row("gemma3:4b", 0.7, "t1", "syntax", Outcome::Correct),
            row("gemma3:4b", 0.7, "t2", "panel", Outcome::Correct),
            row("qwen3:30b", 0.1, "t1", "syntax", Outcome::ScoringError),
            row("qwen3:30b", 0.1, "t2", "panel", Outcome::Correct),
            row("qwen3:30b", 0.7, "t1", "syntax", Outcome::Incorrect),
            row("qwen3:30b", 0.7, "t2", "panel", Outcome::Incorrect),
        ]
    }

    #[test]
    fn test_totals() {
        let report = LedgerReport::from_records(&sample());
        assert_eq!(
            report.totals,
            LedgerTotals {
                unique_tasks: 2,
                rows: 8,
                models: 2,
                temperatures: 2,
                domains: 2,
            }
        );
    }

    #[test]
    fn test_by_model_descending() {
        let report = LedgerReport::from_records(&sample());
        let models: Vec<_> = report.by_model.iter().map(|r| r.model.as_str()).collect();
        assert_eq!(models, vec!["gemma3:4b", "qwen3:30b"]);
        assert_eq!(report.by_model[0].tally, Tally { correct: 3, total: 4 });
        // Scoring Error counts in the denominator.
        assert_eq!(report.by_model[1].tally, Tally { correct: 1, total: 4 });
    }

    #[test]
    fn test_by_temperature_ascending() {
        let mut records = sample();
        records.reverse();
        let report = LedgerReport::from_records(&records);
        let temps: Vec<_> = report.by_temperature.iter().map(|r| r.temperature).collect();
        assert_eq!(temps, vec![0.1, 0.7]);
    }

    #[test]
    fn test_top_combinations() {
        let report = LedgerReport::from_records(&sample());
        let top = &report.top_combinations[0];
        assert_eq!((top.model.as_str(), top.temperature), ("gemma3:4b", 0.7));
        assert_eq!(top.accuracy, 1.0);
        assert_eq!(report.top_combinations.len(), 4);
    }

    #[test]
    fn test_render_hides_single_temperature_tables() {
        let records = vec![
            row("a", 0.1, "t1", "syntax", Outcome::Correct),
            row("b", 0.1, "t1", "syntax", Outcome::Incorrect),
        ];
        let text = LedgerReport::from_records(&records).render_text();
        assert!(text.contains("ACCURACY BY MODEL:"));
        assert!(!text.contains("ACCURACY BY TEMPERATURE"));
        assert!(!text.contains("BEST MODEL-TEMPERATURE"));
    }

    #[test]
    fn test_render_full() {
        let text = LedgerReport::from_records(&sample()).render_text();
        assert!(text.contains("Benchmark items evaluated: 2"));
        assert!(text.contains("ACCURACY BY TEMPERATURE"));
        assert!(text.contains("gemma3:4b (T=0.7):  100.0% (2/2)"));
    }

    #[test]
    fn test_empty_ledger() {
        let report = LedgerReport::from_records(&[]);
        assert!(report.is_empty());
        assert_eq!(report.render_text(), "No results recorded.");
    }

    #[test]
    fn test_run_summary_from_records() {
        let summary = RunSummary::from_records("qwen3:30b", 0.1, &sample());
        assert_eq!(summary.total, 2);
        assert_eq!(summary.correct, 1);
        assert_eq!(summary.scoring_errors, 1);
        assert_eq!(summary.accuracy(), 0.5);
    }

    #[test]
    fn test_report_serializes() {
        let value = serde_json::to_value(LedgerReport::from_records(&sample())).unwrap();
        assert_eq!(value["totals"]["rows"], 8);
        assert_eq!(value["by_model"][0]["correct"], 3);
    }
}
