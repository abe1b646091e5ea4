//! Per-file results and the accuracy summary for labelled recordings.

use std::fmt::Write as _;

use samd_core::Disposition;
use serde::Serialize;

/// Label implied by a recording's file name, if any.
///
/// "machine" wins over "human"/"person"; matching ignores case.
pub fn expected_from_file_name(name: &str) -> Option<Disposition> {
    let lower = name.to_ascii_lowercase();
    if lower.contains("machine") {
        Some(Disposition::Machine)
    } else if lower.contains("human") || lower.contains("person") {
        Some(Disposition::Human)
    } else {
        None
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResult {
    pub file: String,
    pub expected: Option<Disposition>,
    pub result: Disposition,
    /// Stream time of the deciding AMD event.
    pub decided_at_ms: Option<u32>,
}

/// Detection counts for one expected class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tally {
    pub total: u32,
    pub machine: u32,
    pub human: u32,
    pub no_voice: u32,
    pub unknown: u32,
}

impl Tally {
    fn record(&mut self, result: Disposition) {
        self.total += 1;
        match result {
            Disposition::Machine => self.machine += 1,
            Disposition::Human => self.human += 1,
            Disposition::NoVoice => self.no_voice += 1,
            Disposition::Unknown => self.unknown += 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRow {
    pub expected: Disposition,
    #[serde(flatten)]
    pub tally: Tally,
    pub correct: u32,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub rows: Vec<SummaryRow>,
    pub correct: u32,
    pub total: u32,
    pub accuracy: f64,
}

impl Summary {
    /// CSV-style table as printed after the per-file lines.
    pub fn render(&self) -> String {
        let mut out = String::from("\n*** SUMMARY ***\n");
        out.push_str("expected,machines,humans,no-voice,unknown,accuracy\n");
        for row in &self.rows {
            let _ = writeln!(
                out,
                "{},{},{},{},{},{:.2}",
                row.expected,
                row.tally.machine,
                row.tally.human,
                row.tally.no_voice,
                row.tally.unknown,
                row.accuracy
            );
        }
        let _ = writeln!(
            out,
            "\noverall accuracy = ({}/{}) * 100.0 = {:.6}",
            self.correct, self.total, self.accuracy
        );
        out
    }
}

/// Running results of one batch.
#[derive(Debug, Default)]
pub struct Stats {
    files: Vec<FileResult>,
    humans: Tally,
    machines: Tally,
}

impl Stats {
    pub fn record(&mut self, result: FileResult) {
        match result.expected {
            Some(Disposition::Human) => self.humans.record(result.result),
            Some(Disposition::Machine) => self.machines.record(result.result),
            _ => {}
        }
        self.files.push(result);
    }

    pub fn files(&self) -> &[FileResult] {
        &self.files
    }

    /// Accuracy per labelled class. `None` when no file carried a label.
    ///
    /// A human answering with dead air still counts as a correct human
    /// detection: the call would be routed to an agent either way.
    pub fn summary(&self) -> Option<Summary> {
        let mut rows = Vec::new();
        if self.humans.total > 0 {
            let correct = self.humans.human + self.humans.no_voice;
            rows.push(row(Disposition::Human, self.humans, correct));
        }
        if self.machines.total > 0 {
            rows.push(row(Disposition::Machine, self.machines, self.machines.machine));
        }
        if rows.is_empty() {
            return None;
        }
        let correct = rows.iter().map(|r| r.correct).sum();
        let total = rows.iter().map(|r| r.tally.total).sum();
        Some(Summary {
            rows,
            correct,
            total,
            accuracy: percent(correct, total),
        })
    }

    pub fn to_report(&self) -> Report<'_> {
        Report {
            files: &self.files,
            summary: self.summary(),
        }
    }
}

/// JSON document written with `--json`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report<'a> {
    pub files: &'a [FileResult],
    pub summary: Option<Summary>,
}

fn row(expected: Disposition, tally: Tally, correct: u32) -> SummaryRow {
    SummaryRow {
        expected,
        tally,
        correct,
        accuracy: percent(correct, tally.total),
    }
}

fn percent(part: u32, whole: u32) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    f64::from(part) / f64::from(whole) * 100.0
}
