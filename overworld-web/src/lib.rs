#![forbid(unsafe_code)]
//! Browser host for the overworld predictor.
//!
//! Binds the core session logic to the browser: the engine module is loaded
//! through `WebAssembly`, the remote process is reached over `fetch`, and the
//! page drives everything through [`client::OverworldClient`].

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

pub mod api;
pub mod client;
pub mod config;
pub mod dom;
pub mod engine;
pub mod logger;
#[cfg(target_arch = "wasm32")]
mod test_bridge;
pub mod timer;

pub use client::{ClientCore, ClientError, OverworldClient};
pub use config::ClientConfig;

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn start() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
    logger::init(log::LevelFilter::Info);
}
