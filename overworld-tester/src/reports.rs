use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use std::io::Write;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    pub browser: String,
    pub scenario: String,
    pub status: Status,
    pub duration_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ScenarioResult {
    pub fn new(browser: &str, scenario: &str, status: Status, duration: Duration) -> Self {
        Self {
            browser: browser.to_string(),
            scenario: scenario.to_string(),
            status,
            duration_ms: duration.as_millis(),
            detail: None,
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Tally {
    pub fn of(results: &[ScenarioResult]) -> Self {
        results.iter().fold(Self::default(), |mut tally, r| {
            match r.status {
                Status::Passed => tally.passed += 1,
                Status::Failed => tally.failed += 1,
                Status::Skipped => tally.skipped += 1,
            }
            tally
        })
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    summary: Tally,
    total_ms: u128,
    results: &'a [ScenarioResult],
}

pub fn generate_json_report<W: Write>(
    writer: &mut W,
    results: &[ScenarioResult],
    total: Duration,
) -> Result<()> {
    let report = JsonReport {
        summary: Tally::of(results),
        total_ms: total.as_millis(),
        results,
    };
    serde_json::to_writer_pretty(&mut *writer, &report)?;
    writeln!(writer)?;
    Ok(())
}

pub fn generate_console_report<W: Write>(
    writer: &mut W,
    results: &[ScenarioResult],
    total: Duration,
) -> Result<()> {
    writeln!(writer)?;
    writeln!(writer, "{}", "📊 Browser Test Results".bright_cyan().bold())?;
    writeln!(writer, "{}", "=======================".cyan())?;

    if results.is_empty() {
        writeln!(writer, "No scenarios executed.")?;
        return Ok(());
    }

    let tally = Tally::of(results);
    writeln!(writer, "Total scenarios: {}", results.len())?;
    writeln!(writer, "Passed: {}", tally.passed.to_string().green())?;
    writeln!(writer, "Failed: {}", tally.failed.to_string().red())?;
    writeln!(writer, "Skipped: {}", tally.skipped.to_string().yellow())?;
    writeln!(writer, "Total time: {total:?}")?;
    writeln!(writer)?;

    for result in results {
        let status = match result.status {
            Status::Passed => "✅ PASS".green(),
            Status::Failed => "❌ FAIL".red(),
            Status::Skipped => "⏭️  SKIP".yellow(),
        };
        writeln!(
            writer,
            "{status} [{}] {} ({} ms)",
            result.browser,
            result.scenario.bold(),
            result.duration_ms
        )?;
        if let Some(detail) = &result.detail {
            writeln!(writer, "     • {detail}")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<ScenarioResult> {
        vec![
            ScenarioResult::new("chrome", "smoke", Status::Passed, Duration::from_millis(40)),
            ScenarioResult::new("chrome", "filters", Status::Failed, Duration::from_millis(7))
                .with_detail("natures bit 3 not set"),
            ScenarioResult::new("chrome", "connect-cycle", Status::Skipped, Duration::ZERO)
                .with_detail("no --switch-address given"),
        ]
    }

    #[test]
    fn tally_counts_each_status() {
        assert_eq!(
            Tally::of(&sample()),
            Tally {
                passed: 1,
                failed: 1,
                skipped: 1
            }
        );
    }

    #[test]
    fn json_report_carries_summary_and_details() {
        let mut out = Vec::new();
        generate_json_report(&mut out, &sample(), Duration::from_millis(50)).unwrap();
        let report: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(report["summary"]["failed"], 1);
        assert_eq!(report["results"][1]["status"], "failed");
        assert_eq!(report["results"][1]["detail"], "natures bit 3 not set");
        assert!(report["results"][0].get("detail").is_none());
    }

    #[test]
    fn console_report_lists_every_scenario() {
        colored::control::set_override(false);
        let mut out = Vec::new();
        generate_console_report(&mut out, &sample(), Duration::from_millis(50)).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Passed: 1"));
        assert!(text.contains("[chrome] filters (7 ms)"));
        assert!(text.contains("no --switch-address given"));
    }

    #[test]
    fn console_report_handles_empty_runs() {
        let mut out = Vec::new();
        generate_console_report(&mut out, &[], Duration::ZERO).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("No scenarios executed."));
    }
}
