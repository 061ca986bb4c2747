use anyhow::{Context, Result};
use chrono::Utc;
use std::{fs, path::Path};
use thirtyfour::prelude::*;

pub fn artifacts_dir(base: &str, browser: &str, scenario: &str) -> String {
    let ts = Utc::now().format("%Y%m%dT%H%M%S");
    format!("{base}/{browser}/{scenario}/{ts}")
}

/// Save what the page looked like when a scenario failed. Best effort: a
/// dead session still gets its error chain written.
pub async fn capture_artifacts(driver: &WebDriver, dir: &str, err: &anyhow::Error) -> Result<()> {
    fs::create_dir_all(dir).context("creating artifacts dir")?;
    let dir = Path::new(dir);

    if let Ok(png) = driver.screenshot_as_png().await {
        let _ = fs::write(dir.join("screenshot.png"), &png);
    }

    if let Ok(src) = driver.source().await {
        let _ = fs::write(dir.join("dom.html"), src);
    }

    let dump = "const t = window.__overworldTest;\n\
                if (!t) { return null; }\n\
                const plain = (v) => JSON.parse(JSON.stringify(v, (_, x) => typeof x === 'bigint' ? x.toString() : x));\n\
                try { return { state: plain(t.state()), snapshot: plain(t.snapshot()) }; } catch (e) { return { error: String(e) }; }";
    if let Ok(ret) = driver.execute(dump, vec![]).await {
        let _ = fs::write(
            dir.join("state.json"),
            serde_json::to_vec_pretty(ret.json()).unwrap_or_default(),
        );
    }

    let _ = fs::write(dir.join("error.txt"), format!("{err:#}"));
    Ok(())
}

pub fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
        .collect()
}
