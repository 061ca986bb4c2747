use crate::dom;
use async_trait::async_trait;
use overworld_core::Pause;
use std::time::Duration;

/// [`Pause`] backed by `window.setTimeout`. A pause abandoned mid-wait, as
/// when a connect attempt wins its timeout race, clears its timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserPause;

#[async_trait(?Send)]
impl Pause for BrowserPause {
    async fn pause(&self, duration: Duration) {
        let millis = i32::try_from(duration.as_millis()).unwrap_or(i32::MAX);
        if let Err(err) = dom::sleep_ms(millis).await {
            log::warn!("timer failed: {}", dom::js_error_message(&err));
        }
    }
}
