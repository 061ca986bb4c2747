use anyhow::{Context, Result, ensure};
use serde_json::Value;
use std::time::Duration;
use thirtyfour::prelude::*;

use crate::browser::TestBridge;

/// How long the page gets to fetch and instantiate the engine module.
const ENGINE_LOAD_TIMEOUT: Duration = Duration::from_secs(20);
const FOLLOW_WINDOW: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ScenarioCtx<'a> {
    pub base_url: String,
    pub switch_address: Option<String>,
    pub session_timeout: Duration,
    pub bridge: TestBridge<'a>,
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Skipped(&'static str),
}

#[async_trait::async_trait]
pub trait BrowserScenario: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    async fn run_browser(&self, driver: &WebDriver, ctx: &ScenarioCtx<'_>) -> Result<Outcome>;
}

const CATALOG: [&str; 4] = ["smoke", "filters", "generate-idle", "connect-cycle"];

pub fn get_scenario(name: &str) -> Option<Box<dyn BrowserScenario>> {
    match name.to_lowercase().as_str() {
        "smoke" => Some(Box::new(Smoke)),
        "filters" => Some(Box::new(FilterSelection)),
        "generate-idle" => Some(Box::new(GenerateIdle)),
        "connect-cycle" => Some(Box::new(ConnectCycle)),
        _ => None,
    }
}

pub fn list_scenarios() -> Vec<(&'static str, &'static str)> {
    CATALOG
        .iter()
        .filter_map(|name| get_scenario(name))
        .map(|scenario| (scenario.name(), scenario.description()))
        .collect()
}

/// Expand `all` into the full catalog, keeping any other names in order.
pub fn expand_scenarios(names: Vec<String>) -> Vec<String> {
    if !names.iter().any(|n| n == "all") {
        return names;
    }
    let mut expanded: Vec<String> = names.into_iter().filter(|n| n != "all").collect();
    for name in CATALOG {
        if !expanded.iter().any(|n| n == name) {
            expanded.push(name.to_string());
        }
    }
    expanded
}

async fn open_page(driver: &WebDriver, ctx: &ScenarioCtx<'_>) -> Result<()> {
    driver.goto(&ctx.base_url).await?;
    let _app_element = driver.find(By::Css("#app")).await?;
    ctx.bridge.ensure_available().await?;
    let state = ctx
        .bridge
        .wait_for("engine module", ENGINE_LOAD_TIMEOUT, |s| s.engine_loaded)
        .await?;
    if ctx.verbose {
        println!("  🌐 Page loaded, engine ready, state: {}", state.state);
    }
    Ok(())
}

fn filter_word(filters: &Value, field: &str) -> Result<u64> {
    filters
        .get(field)
        .and_then(Value::as_u64)
        .with_context(|| format!("filters have no numeric `{field}`: {filters}"))
}

pub struct Smoke;

#[async_trait::async_trait]
impl BrowserScenario for Smoke {
    fn name(&self) -> &'static str {
        "smoke"
    }

    fn description(&self) -> &'static str {
        "Page boots, engine loads, client idles disconnected"
    }

    async fn run_browser(&self, driver: &WebDriver, ctx: &ScenarioCtx<'_>) -> Result<Outcome> {
        open_page(driver, ctx).await?;
        let state = ctx.bridge.state().await?;
        ensure!(
            state.state == "disconnected",
            "expected a fresh client to be disconnected, got {}",
            state.state
        );
        ensure!(!state.polling, "no session should be polling on load");
        ensure!(state.results == 0, "no results should exist on load");

        let snapshot = ctx.bridge.snapshot().await?;
        ensure!(
            snapshot.get("spawners").and_then(Value::as_array).is_some(),
            "snapshot should list spawners: {snapshot}"
        );
        Ok(Outcome::Passed)
    }
}

pub struct FilterSelection;

#[async_trait::async_trait]
impl BrowserScenario for FilterSelection {
    fn name(&self) -> &'static str {
        "filters"
    }

    fn description(&self) -> &'static str {
        "Filter selections compile into the engine's bitfields"
    }

    async fn run_browser(&self, driver: &WebDriver, ctx: &ScenarioCtx<'_>) -> Result<Outcome> {
        open_page(driver, ctx).await?;
        let bridge = &ctx.bridge;

        let natures = bridge.filter_options("natures").await?;
        ensure!(natures.len() == 25, "expected 25 natures, got {}", natures.len());
        ensure!(
            natures.iter().enumerate().all(|(i, o)| usize::from(o.index) == i),
            "nature indices should be dense"
        );

        let filters = bridge.select_filter("natures", 3).await?.into_value()?;
        ensure!(filter_word(&filters, "natures")? == 1 << 3, "natures bit 3 not set");
        let filters = bridge.select_filter("natures", 10).await?.into_value()?;
        ensure!(
            filter_word(&filters, "natures")? == (1 << 3) | (1 << 10),
            "natures should accumulate selections"
        );
        let filters = bridge.deselect_filter("natures", 3).await?.into_value()?;
        ensure!(filter_word(&filters, "natures")? == 1 << 10, "natures bit 3 not cleared");

        let filters = bridge.select_filter("marks", 33).await?.into_value()?;
        let marks = filters
            .get("marks")
            .and_then(Value::as_array)
            .context("filters have no marks array")?;
        ensure!(
            marks.iter().map(Value::as_u64).collect::<Vec<_>>() == [Some(0), Some(2)],
            "mark 33 should land in the second word, got {marks:?}"
        );

        let error = bridge.select_filter("natures", 25).await?.into_error()?;
        if ctx.verbose {
            println!("  🚫 Out-of-range nature rejected: {error}");
        }
        let error = bridge.select_filter("colour", 0).await?.into_error()?;
        ensure!(error.contains("colour"), "unknown filter error should name it: {error}");
        Ok(Outcome::Passed)
    }
}

pub struct GenerateIdle;

#[async_trait::async_trait]
impl BrowserScenario for GenerateIdle {
    fn name(&self) -> &'static str {
        "generate-idle"
    }

    fn description(&self) -> &'static str {
        "Generating with no spawner selected yields no results"
    }

    async fn run_browser(&self, driver: &WebDriver, ctx: &ScenarioCtx<'_>) -> Result<Outcome> {
        open_page(driver, ctx).await?;
        ctx.bridge.select_spawner(None).await?;
        let results = ctx.bridge.generate().await?.into_value()?;
        let results = results
            .as_array()
            .with_context(|| format!("generate should return an array, got {results}"))?;
        ensure!(results.is_empty(), "expected no results, got {}", results.len());
        let state = ctx.bridge.state().await?;
        ensure!(state.results == 0, "stored results should be empty");
        Ok(Outcome::Passed)
    }
}

pub struct ConnectCycle;

#[async_trait::async_trait]
impl BrowserScenario for ConnectCycle {
    fn name(&self) -> &'static str {
        "connect-cycle"
    }

    fn description(&self) -> &'static str {
        "Connect to a live console, follow advances, disconnect (needs --switch-address)"
    }

    async fn run_browser(&self, driver: &WebDriver, ctx: &ScenarioCtx<'_>) -> Result<Outcome> {
        let Some(address) = ctx.switch_address.as_deref() else {
            return Ok(Outcome::Skipped("no --switch-address given"));
        };
        open_page(driver, ctx).await?;
        let bridge = &ctx.bridge;

        let connected = bridge.connect(address).await?;
        connected
            .into_value()
            .with_context(|| format!("connecting to {address}"))?;
        let state = bridge
            .wait_for("polling", ctx.session_timeout, |s| {
                s.state == "connected" && s.polling
            })
            .await?;
        if ctx.verbose {
            println!("  🔌 Connected to {address}, {} spawners loaded", state.spawners);
        }

        let first = state.advances;
        tokio::time::sleep(FOLLOW_WINDOW).await;
        let later = bridge.state().await?;
        ensure!(later.state == "connected", "session dropped while following");
        ensure!(
            later.advances >= first,
            "advance count went backwards: {first} -> {}",
            later.advances
        );

        bridge.disconnect().await?;
        bridge
            .wait_for("disconnect", ctx.session_timeout, |s| {
                s.state == "disconnected" && !s.polling
            })
            .await?;
        Ok(Outcome::Passed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_names_resolve() {
        for name in CATALOG {
            let scenario = get_scenario(name).expect("catalog entry resolves");
            assert_eq!(scenario.name(), name);
        }
        assert!(get_scenario("SMOKE").is_some());
        assert!(get_scenario("full-game").is_none());
    }

    #[test]
    fn listing_covers_catalog() {
        let listed = list_scenarios();
        assert_eq!(listed.len(), CATALOG.len());
        assert!(listed.iter().all(|(_, description)| !description.is_empty()));
    }

    #[test]
    fn all_expands_without_duplicates() {
        let expanded = expand_scenarios(vec!["filters".to_string(), "all".to_string()]);
        assert_eq!(expanded[0], "filters");
        assert_eq!(expanded.len(), CATALOG.len());
    }

    #[test]
    fn explicit_names_keep_their_order() {
        let names = vec!["generate-idle".to_string(), "smoke".to_string()];
        assert_eq!(expand_scenarios(names.clone()), names);
    }

    #[test]
    fn filter_words_must_be_numeric() {
        let filters = serde_json::json!({ "natures": 8, "marks": [0, 2] });
        assert_eq!(filter_word(&filters, "natures").unwrap(), 8);
        assert!(filter_word(&filters, "marks").is_err());
        assert!(filter_word(&filters, "genders").is_err());
    }
}
