use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use thirtyfour::prelude::*;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Runs `body` inside the page and reports either its value or the thrown
/// error. `BigInt`s are not representable in WebDriver JSON, so they come
/// back as decimal strings.
fn guarded(body: &str) -> String {
    format!(
        "const plain = (v) => v === undefined ? null : JSON.parse(JSON.stringify(v, (_, x) => typeof x === 'bigint' ? x.toString() : x));\n\
         try {{ return {{ ok: true, value: plain({body}) }}; }}\n\
         catch (e) {{ return {{ ok: false, error: String((e && e.message) || e) }}; }}"
    )
}

/// Same contract as [`guarded`] for bridge calls that return a promise.
fn guarded_async(body: &str) -> String {
    format!(
        "const done = arguments[arguments.length - 1];\n\
         const plain = (v) => v === undefined ? null : JSON.parse(JSON.stringify(v, (_, x) => typeof x === 'bigint' ? x.toString() : x));\n\
         Promise.resolve().then(() => {body}).then(\n\
           (v) => done({{ ok: true, value: plain(v) }}),\n\
           (e) => done({{ ok: false, error: String((e && e.message) || e) }}));"
    )
}

fn u64_from_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wide {
        Number(u64),
        Text(String),
    }
    match Wide::deserialize(deserializer)? {
        Wide::Number(n) => Ok(n),
        Wide::Text(text) => text.parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BridgeState {
    pub state: String,
    pub engine_loaded: bool,
    pub polling: bool,
    #[serde(deserialize_with = "u64_from_text")]
    pub advances: u64,
    pub spawners: usize,
    pub selected_spawner: Option<usize>,
    pub results: usize,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct FilterOption {
    pub index: u8,
    pub name: String,
}

/// Result of one guarded bridge call.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CallOutcome {
    pub ok: bool,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl CallOutcome {
    pub fn into_value(self) -> Result<Value> {
        if self.ok {
            Ok(self.value.unwrap_or(Value::Null))
        } else {
            Err(anyhow!(
                "bridge call threw: {}",
                self.error.unwrap_or_else(|| "unknown error".to_string())
            ))
        }
    }

    pub fn into_error(self) -> Result<String> {
        if self.ok {
            bail!("bridge call succeeded but was expected to fail: {:?}", self.value);
        }
        Ok(self.error.unwrap_or_default())
    }
}

#[derive(Debug, Clone)]
pub struct TestBridge<'a> {
    driver: &'a WebDriver,
}

impl<'a> TestBridge<'a> {
    pub const fn new(driver: &'a WebDriver) -> Self {
        Self { driver }
    }

    pub async fn ensure_available(&self) -> Result<()> {
        let result = self
            .driver
            .execute("return !!window.__overworldTest", vec![])
            .await?;
        let ok = result.json().as_bool().unwrap_or(false);
        if !ok {
            bail!("__overworldTest is not available. Did you pass ?test=1 to the page?");
        }
        Ok(())
    }

    async fn call(&self, body: &str, args: Vec<Value>) -> Result<CallOutcome> {
        let result = self.driver.execute(&guarded(body), args).await?;
        serde_json::from_value(result.json().clone()).context("parsing bridge call result")
    }

    async fn call_async(&self, body: &str, args: Vec<Value>) -> Result<CallOutcome> {
        let result = self.driver.execute_async(&guarded_async(body), args).await?;
        serde_json::from_value(result.json().clone()).context("parsing bridge call result")
    }

    pub async fn state(&self) -> Result<BridgeState> {
        let value = self
            .call("window.__overworldTest.state()", vec![])
            .await?
            .into_value()?;
        serde_json::from_value(value).context("parsing BridgeState")
    }

    pub async fn snapshot(&self) -> Result<Value> {
        self.call("window.__overworldTest.snapshot()", vec![])
            .await?
            .into_value()
    }

    pub async fn filter_options(&self, kind: &str) -> Result<Vec<FilterOption>> {
        let value = self
            .call(
                "window.__overworldTest.filterOptions(arguments[0])",
                vec![kind.into()],
            )
            .await?
            .into_value()?;
        serde_json::from_value(value).context("parsing filter options")
    }

    pub async fn select_filter(&self, kind: &str, index: u8) -> Result<CallOutcome> {
        self.call(
            "window.__overworldTest.selectFilter(arguments[0], arguments[1])",
            vec![kind.into(), index.into()],
        )
        .await
    }

    pub async fn deselect_filter(&self, kind: &str, index: u8) -> Result<CallOutcome> {
        self.call(
            "window.__overworldTest.deselectFilter(arguments[0], arguments[1])",
            vec![kind.into(), index.into()],
        )
        .await
    }

    pub async fn select_spawner(&self, index: Option<usize>) -> Result<()> {
        self.call(
            "window.__overworldTest.selectSpawner(arguments[0])",
            vec![index.map_or(Value::Null, Value::from)],
        )
        .await?
        .into_value()
        .map(|_| ())
    }

    pub async fn generate(&self) -> Result<CallOutcome> {
        self.call("window.__overworldTest.generate()", vec![]).await
    }

    pub async fn connect(&self, address: &str) -> Result<CallOutcome> {
        self.call_async(
            "window.__overworldTest.connect(arguments[0])",
            vec![address.into()],
        )
        .await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.call("window.__overworldTest.disconnect()", vec![])
            .await?
            .into_value()
            .map(|_| ())
    }

    /// Poll the bridge state until `ready` holds or `timeout` elapses.
    pub async fn wait_for<F>(&self, what: &str, timeout: Duration, ready: F) -> Result<BridgeState>
    where
        F: Fn(&BridgeState) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            let state = self.state().await?;
            if ready(&state) {
                return Ok(state);
            }
            if Instant::now() >= deadline {
                bail!("timed out after {timeout:?} waiting for {what}; last state {state:?}");
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}
