use js_sys::{Function, Promise};
use wasm_bindgen::JsCast;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::{Request, Response, Window};

/// Retrieve the global `window` object.
///
/// # Errors
/// Returns an error when executed outside of a browser context.
pub fn window() -> Result<Window, JsValue> {
    web_sys::window().ok_or_else(|| JsValue::from_str("`window` is not available"))
}

/// Convert a JavaScript value into a readable string for error reporting.
#[must_use]
pub fn js_error_message(value: &JsValue) -> String {
    value
        .as_string()
        .or_else(|| {
            value
                .dyn_ref::<js_sys::Error>()
                .map(|err| err.message().into())
        })
        .unwrap_or_else(|| format!("{value:?}"))
}

/// True when the page was opened with `test=1` in its query string.
#[must_use]
pub fn test_mode_enabled() -> bool {
    window()
        .ok()
        .and_then(|win| win.location().search().ok())
        .is_some_and(|search| search.contains("test=1"))
}

/// A pending `window.setTimeout`. Dropping it clears the timer and frees
/// the callback.
pub struct Timeout {
    window: Window,
    handle: i32,
    _callback: Closure<dyn FnMut()>,
}

impl Timeout {
    /// Run `callback` once `duration_ms` have passed.
    ///
    /// # Errors
    /// Returns an error if there is no window or the timer cannot be scheduled.
    pub fn after(duration_ms: i32, callback: impl FnMut() + 'static) -> Result<Self, JsValue> {
        let window = window()?;
        let callback = Closure::<dyn FnMut()>::new(callback);
        let handle = window.set_timeout_with_callback_and_timeout_and_arguments_0(
            callback.as_ref().unchecked_ref(),
            duration_ms,
        )?;
        Ok(Self {
            window,
            handle,
            _callback: callback,
        })
    }
}

impl Drop for Timeout {
    fn drop(&mut self) {
        self.window.clear_timeout_with_handle(self.handle);
    }
}

/// Yield execution for the requested number of milliseconds.
///
/// Dropping the returned future before it completes cancels the timer.
///
/// # Errors
/// Returns an error if the timer cannot be scheduled or the underlying JavaScript promise rejects.
#[allow(clippy::future_not_send)] // Wasm futures rely on `JsFuture`, which is not `Send`.
pub async fn sleep_ms(duration_ms: i32) -> Result<(), JsValue> {
    let mut resolve_slot: Option<Function> = None;
    let promise = Promise::new(&mut |resolve, _reject| {
        resolve_slot = Some(resolve);
    });

    let resolve =
        resolve_slot.ok_or_else(|| JsValue::from_str("resolve function should be set"))?;
    let _timeout = Timeout::after(duration_ms, move || {
        let _ = resolve.call0(&JsValue::UNDEFINED);
    })?;

    JsFuture::from(promise).await?;
    Ok(())
}

/// Perform a GET request and return the browser `Response`.
///
/// # Errors
/// Returns an error if the fetch request fails or the response cannot be converted to `Response`.
#[allow(clippy::future_not_send)] // Wasm futures rely on `JsFuture`, which is not `Send`.
pub async fn fetch_response(url: &str) -> Result<Response, JsValue> {
    let resp_value = JsFuture::from(window()?.fetch_with_str(url)).await?;
    resp_value.dyn_into::<Response>()
}

/// Perform a prepared request and return the browser `Response`.
///
/// # Errors
/// Returns an error if the fetch request fails or the response cannot be converted to `Response`.
#[allow(clippy::future_not_send)] // Wasm futures rely on `JsFuture`, which is not `Send`.
pub async fn fetch_request(request: &Request) -> Result<Response, JsValue> {
    let resp_value = JsFuture::from(window()?.fetch_with_request(request)).await?;
    resp_value.dyn_into::<Response>()
}

/// Read a response body as bytes.
///
/// # Errors
/// Returns an error if the body cannot be read.
#[allow(clippy::future_not_send)] // Wasm futures rely on `JsFuture`, which is not `Send`.
pub async fn response_bytes(response: &Response) -> Result<Vec<u8>, JsValue> {
    let buffer = JsFuture::from(response.array_buffer()?).await?;
    Ok(js_sys::Uint8Array::new(&buffer).to_vec())
}

/// Read a response body as text.
///
/// # Errors
/// Returns an error if the body cannot be read or is not a string.
#[allow(clippy::future_not_send)] // Wasm futures rely on `JsFuture`, which is not `Send`.
pub async fn response_text(response: &Response) -> Result<String, JsValue> {
    JsFuture::from(response.text()?)
        .await?
        .as_string()
        .ok_or_else(|| JsValue::from_str("response body is not text"))
}
