mod browser;
mod reports;
mod scenarios;
mod util;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use browser::{BrowserConfig, BrowserKind, TestBridge, new_session};
use reports::{ScenarioResult, Status};
use scenarios::{Outcome, ScenarioCtx, expand_scenarios, get_scenario, list_scenarios};
use util::{artifacts_dir, capture_artifacts, split_csv};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum HeadlessMode {
    /// Run browsers in headless mode
    Headless,
    /// Run browsers with visible windows
    Windowed,
}

impl HeadlessMode {
    const fn is_headless(self) -> bool {
        matches!(self, Self::Headless)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Console,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "overworld-tester", version)]
#[command(about = "Browser QA for the overworld predictor, driven through its test bridge")]
struct Args {
    /// Scenarios to run (comma-separated, `all` for the whole catalog)
    #[arg(long, default_value = "smoke")]
    scenarios: String,

    /// List all available scenarios and exit
    #[arg(long)]
    list_scenarios: bool,

    /// Browsers to run (chrome,edge,firefox,safari)
    #[arg(long, default_value = "chrome")]
    browsers: String,

    /// Page hosting the client (must include ?test=1 to expose the bridge)
    #[arg(long, default_value = "http://localhost:8080/?test=1")]
    base_url: String,

    /// Address of a console running the remote endpoint, for scenarios that connect
    #[arg(long)]
    switch_address: Option<String>,

    /// Seconds to wait for session state changes after connecting
    #[arg(long, default_value_t = 10)]
    session_timeout: u64,

    /// Output report format
    #[arg(long, value_enum, default_value_t = ReportFormat::Console)]
    report: ReportFormat,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Artifacts directory for screenshots and state dumps of failed scenarios
    #[arg(long, default_value = "target/test-artifacts")]
    artifacts_dir: String,

    /// Connect to a Selenium Grid/Appium hub instead of local drivers
    #[arg(long)]
    hub: Option<String>,

    /// Run headless where supported
    #[arg(long, value_enum, default_value_t = HeadlessMode::Headless)]
    headless: HeadlessMode,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if maybe_list_scenarios(&args)? {
        return Ok(());
    }

    announce_banner();

    let start_time = Instant::now();
    let scenarios = expand_scenarios(split_csv(&args.scenarios));
    let results = run_browser_scenarios(&args, &scenarios).await;
    write_reports(&args, &results, start_time.elapsed())?;

    if results.iter().any(|r| r.status == Status::Failed) {
        std::process::exit(1);
    }
    Ok(())
}

fn maybe_list_scenarios(args: &Args) -> Result<bool> {
    if !args.list_scenarios {
        return Ok(false);
    }
    let mut output_target = OutputTarget::new(args.output.clone())?;
    writeln!(output_target.writer(), "Available scenarios:")?;
    for (key, description) in list_scenarios() {
        writeln!(output_target.writer(), "  {key:20} - {description}")?;
    }
    output_target.flush_inner()?;
    Ok(true)
}

fn announce_banner() {
    println!("{}", "🧭 Overworld Browser Tester".bright_cyan().bold());
    println!("{}", "===========================".cyan());
}

fn build_browser_config(args: &Args) -> BrowserConfig {
    BrowserConfig {
        headless: args.headless.is_headless(),
        remote_hub: args.hub.clone(),
        ..BrowserConfig::default()
    }
}

async fn run_browser_scenarios(args: &Args, scenarios: &[String]) -> Vec<ScenarioResult> {
    let mut results = Vec::new();

    for browser_name in split_csv(&args.browsers) {
        let Some(kind) = BrowserKind::parse(&browser_name) else {
            eprintln!("⚠️  Unknown browser: {}", browser_name.yellow());
            continue;
        };

        let driver = match new_session(kind, &build_browser_config(args)).await {
            Ok(d) => d,
            Err(e) => {
                eprintln!("❌ Could not start {}: {e}", kind.label());
                results.push(
                    ScenarioResult::new(kind.label(), "session", Status::Failed, Duration::ZERO)
                        .with_detail(e.to_string()),
                );
                continue;
            }
        };

        results.extend(run_scenarios_for_driver(args, scenarios, kind, &driver).await);
        if let Err(e) = driver.quit().await {
            log::warn!("closing {} session failed: {e}", kind.label());
        }
    }

    results
}

async fn run_scenarios_for_driver(
    args: &Args,
    scenarios: &[String],
    kind: BrowserKind,
    driver: &thirtyfour::WebDriver,
) -> Vec<ScenarioResult> {
    let label = kind.label();
    let mut results = Vec::new();

    for scenario_name in scenarios {
        let Some(scenario) = get_scenario(scenario_name) else {
            eprintln!("⚠️  Unknown scenario: {}", scenario_name.yellow());
            continue;
        };
        let ctx = ScenarioCtx {
            base_url: args.base_url.clone(),
            switch_address: args.switch_address.clone(),
            session_timeout: Duration::from_secs(args.session_timeout),
            bridge: TestBridge::new(driver),
            verbose: args.verbose,
        };

        let scenario_start = Instant::now();
        let outcome = scenario.run_browser(driver, &ctx).await;
        let duration = scenario_start.elapsed();
        let result = match outcome {
            Ok(Outcome::Passed) => {
                println!("✅ [{}] {} - {duration:?}", label.green(), scenario_name);
                ScenarioResult::new(label, scenario_name, Status::Passed, duration)
            }
            Ok(Outcome::Skipped(reason)) => {
                println!("⏭️  [{}] {} - {reason}", label.yellow(), scenario_name);
                ScenarioResult::new(label, scenario_name, Status::Skipped, duration)
                    .with_detail(reason)
            }
            Err(e) => {
                eprintln!("❌ [{}] {} - {duration:?}: {e:#}", label.red(), scenario_name);
                let dir = artifacts_dir(&args.artifacts_dir, label, scenario_name);
                if let Err(capture) = capture_artifacts(driver, &dir, &e).await {
                    log::warn!("could not save artifacts to {dir}: {capture:#}");
                }
                ScenarioResult::new(label, scenario_name, Status::Failed, duration)
                    .with_detail(format!("{e:#}"))
            }
        };
        results.push(result);
    }

    results
}

fn write_reports(args: &Args, results: &[ScenarioResult], total: Duration) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;
    match args.report {
        ReportFormat::Json => reports::generate_json_report(&mut output_target, results, total)?,
        ReportFormat::Console => {
            reports::generate_console_report(&mut output_target, results, total)?;
            writeln!(&mut output_target)?;
            writeln!(&mut output_target, "🏁 Total time: {total:?}")?;
        }
    }
    output_target.flush_inner()?;
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}
