//! JavaScript-facing client.
//!
//! [`ClientCore`] holds all state and logic in plain Rust; [`OverworldClient`]
//! is the thin `wasm_bindgen` wrapper the page talks to.

use crate::api::HttpEndpoint;
use crate::config::ClientConfig;
use crate::engine::{EngineLoadError, WasmEngine};
use crate::logger;
use crate::timer::BrowserPause;
use overworld_core::{
    ConfigError, ConnectionState, Engine, FilterError, FilterKind, FilterOption, FilterSelection,
    Filters, GenerateError, IvRange, MemoryBridge, OverworldSpec, Pause, RemoteEndpoint,
    ResultSet, Session, SessionControl, SessionError, Settings, SpawnerSummary,
};
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use thiserror::Error;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, spawn_local};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("engine module is not loaded")]
    EngineNotLoaded,
    #[error("previous session is still shutting down")]
    Busy,
    #[error("unknown filter `{0}`")]
    UnknownFilter(String),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Generate(#[from] GenerateError),
    #[error(transparent)]
    Load(#[from] EngineLoadError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid value from JavaScript: {0}")]
    Js(String),
}

impl From<serde_wasm_bindgen::Error> for ClientError {
    fn from(err: serde_wasm_bindgen::Error) -> Self {
        Self::Js(err.to_string())
    }
}

impl From<ClientError> for JsValue {
    fn from(err: ClientError) -> Self {
        js_sys::Error::new(&err.to_string()).into()
    }
}

/// Client state shared between the page, the poll loop and the test bridge.
pub struct ClientCore<E: Engine> {
    config: ClientConfig,
    bridge: RefCell<Option<MemoryBridge<E>>>,
    control: SessionControl,
    filters: RefCell<FilterSelection>,
    spawner: Cell<Option<usize>>,
    results: RefCell<ResultSet>,
    polling: Cell<bool>,
}

impl<E: Engine> ClientCore<E> {
    /// # Errors
    ///
    /// Returns an error if `config` does not validate.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        Ok(Self {
            config,
            bridge: RefCell::new(None),
            control: SessionControl::new(),
            filters: RefCell::new(FilterSelection::new()),
            spawner: Cell::new(None),
            results: RefCell::new(ResultSet::new()),
            polling: Cell::new(false),
        })
    }

    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub const fn control(&self) -> &SessionControl {
        &self.control
    }

    pub fn attach_engine(&self, engine: E) {
        *self.bridge.borrow_mut() = Some(MemoryBridge::new(engine));
    }

    #[must_use]
    pub fn engine_loaded(&self) -> bool {
        self.bridge.borrow().is_some()
    }

    fn bridge(&self) -> Result<MemoryBridge<E>, ClientError> {
        self.bridge.borrow().clone().ok_or(ClientError::EngineNotLoaded)
    }

    /// Build a session sharing this client's control handle.
    ///
    /// # Errors
    ///
    /// Fails if no engine is attached or a previous poll loop is still
    /// draining its last iteration.
    pub fn session<R: RemoteEndpoint, P: Pause>(
        &self,
        endpoint: R,
        pause: P,
    ) -> Result<Session<R, E, P>, ClientError> {
        if self.polling.get() {
            return Err(ClientError::Busy);
        }
        let session = Session::new(endpoint, self.bridge()?, pause, self.config.session.clone())?;
        Ok(session.with_control(self.control.clone()))
    }

    pub fn set_polling(&self, polling: bool) {
        self.polling.set(polling);
    }

    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.polling.get()
    }

    #[must_use]
    pub fn settings(&self) -> Settings {
        self.control.context().settings.clone()
    }

    pub fn set_settings(&self, settings: Settings) {
        self.control.with_settings_mut(|current| *current = settings);
    }

    #[must_use]
    pub fn filters(&self) -> Filters {
        *self.filters.borrow().filters()
    }

    #[must_use]
    pub fn iv_range(&self) -> IvRange {
        *self.filters.borrow().ivs()
    }

    /// # Errors
    ///
    /// Returns an error for an unknown filter name or option.
    pub fn select_filter(&self, kind: &str, index: u8) -> Result<Filters, ClientError> {
        let kind = parse_kind(kind)?;
        self.filters.borrow_mut().select(kind, index)?;
        Ok(self.filters())
    }

    /// # Errors
    ///
    /// Returns an error for an unknown filter name.
    pub fn deselect_filter(&self, kind: &str, index: u8) -> Result<Filters, ClientError> {
        let kind = parse_kind(kind)?;
        self.filters.borrow_mut().deselect(kind, index)?;
        Ok(self.filters())
    }

    /// # Errors
    ///
    /// Returns an error for an unknown filter name or option.
    pub fn set_filter(&self, kind: &str, indices: &[u8]) -> Result<Filters, ClientError> {
        let kind = parse_kind(kind)?;
        self.filters.borrow_mut().set(kind, indices)?;
        Ok(self.filters())
    }

    /// # Errors
    ///
    /// Returns an error if `stat` is not a stat slot.
    pub fn set_iv_range(&self, stat: usize, min: u8, max: u8) -> Result<Filters, ClientError> {
        self.filters.borrow_mut().set_iv_range(stat, min, max)?;
        Ok(self.filters())
    }

    pub fn clear_filters(&self) {
        self.filters.borrow_mut().clear();
    }

    /// # Errors
    ///
    /// Returns an error for an unknown filter name.
    pub fn selected_filter(&self, kind: &str) -> Result<Vec<u8>, ClientError> {
        Ok(self.filters.borrow().selected(parse_kind(kind)?))
    }

    pub fn select_spawner(&self, index: Option<usize>) {
        self.spawner.set(index);
    }

    #[must_use]
    pub fn selected_spawner(&self) -> Option<usize> {
        self.spawner.get()
    }

    /// Summary of the selected spawner, if it is still loaded.
    #[must_use]
    pub fn spawner_summary(&self) -> Option<SpawnerSummary> {
        let index = self.spawner.get()?;
        self.control.context().spawner_summary(index)
    }

    /// Generate for the selected spawner and replace the stored results.
    ///
    /// # Errors
    ///
    /// Returns an error if no engine is attached or the engine call fails.
    pub fn generate(&self) -> Result<Vec<OverworldSpec>, ClientError> {
        let bridge = self.bridge()?;
        let context = self.control.snapshot();
        let template = self.spawner.get().and_then(|i| context.template_for(i));
        let filters = self.filters();
        let results = context.generate(&bridge, &filters, template.as_ref())?;
        log::debug!("generated {} results", results.len());
        self.results.borrow_mut().replace(results.clone());
        Ok(results)
    }

    #[must_use]
    pub fn results(&self) -> Vec<OverworldSpec> {
        self.results.borrow().results().to_vec()
    }
}

fn parse_kind(label: &str) -> Result<FilterKind, ClientError> {
    FilterKind::parse(label).ok_or_else(|| ClientError::UnknownFilter(label.to_string()))
}

/// Options of one filter enumeration.
///
/// # Errors
///
/// Returns an error for an unknown filter name.
pub fn filter_options(kind: &str) -> Result<&'static [FilterOption], ClientError> {
    Ok(parse_kind(kind)?.table().options)
}

#[must_use]
pub const fn state_label(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Disconnected => "disconnected",
        ConnectionState::Connecting => "connecting",
        ConnectionState::Connected => "connected",
    }
}

/// Serialize for JS; 64-bit values become `BigInt`s so RNG words survive.
pub(crate) fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    let serializer =
        serde_wasm_bindgen::Serializer::new().serialize_large_number_types_as_bigints(true);
    value
        .serialize(&serializer)
        .map_err(|err| ClientError::from(err).into())
}

/// Connect, then hand the poll loop to the browser's task queue.
///
/// The returned promise settles once the handshake finished; polling goes on
/// in the background until a disconnect is requested.
pub(crate) fn connect_promise(core: Rc<ClientCore<WasmEngine>>, address: String) -> js_sys::Promise {
    future_to_promise(async move {
        let endpoint = HttpEndpoint::new(&core.config().api_base);
        let mut session = core.session(endpoint, BrowserPause)?;
        core.set_polling(true);
        let connected = session.connect(&address).await;
        match connected {
            Ok(()) => {
                spawn_local(async move {
                    session.poll_loop().await;
                    core.set_polling(false);
                });
                Ok::<_, JsValue>(JsValue::TRUE)
            }
            Err(err) => {
                core.set_polling(false);
                Err(ClientError::from(err).into())
            }
        }
    })
}

pub(crate) fn load_promise(core: Rc<ClientCore<WasmEngine>>) -> js_sys::Promise {
    future_to_promise(async move {
        let engine = WasmEngine::load(&core.config().engine_url)
            .await
            .map_err(ClientError::from)?;
        core.attach_engine(engine);
        Ok::<_, JsValue>(JsValue::TRUE)
    })
}

#[wasm_bindgen]
pub struct OverworldClient {
    core: Rc<ClientCore<WasmEngine>>,
}

#[wasm_bindgen]
impl OverworldClient {
    /// Create a client from an optional `ClientConfig`-shaped object.
    ///
    /// # Errors
    /// Returns an error if the config cannot be parsed or does not validate.
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<Self, JsValue> {
        let config: ClientConfig = if config.is_undefined() || config.is_null() {
            ClientConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config).map_err(ClientError::from)?
        };
        logger::init(logger::parse_level(&config.log_level));
        let core = Rc::new(ClientCore::new(config)?);
        #[cfg(target_arch = "wasm32")]
        crate::test_bridge::install(&core);
        Ok(Self { core })
    }

    /// Fetch and instantiate the engine module.
    #[wasm_bindgen(js_name = loadEngine)]
    pub fn load_engine(&self) -> js_sys::Promise {
        load_promise(Rc::clone(&self.core))
    }

    #[wasm_bindgen(js_name = engineLoaded)]
    pub fn engine_loaded(&self) -> bool {
        self.core.engine_loaded()
    }

    pub fn connect(&self, address: String) -> js_sys::Promise {
        connect_promise(Rc::clone(&self.core), address)
    }

    pub fn disconnect(&self) {
        self.core.control().request_disconnect();
    }

    pub fn state(&self) -> String {
        state_label(self.core.control().state()).to_string()
    }

    /// Cumulative advances since connect.
    #[allow(clippy::cast_precision_loss)]
    pub fn advances(&self) -> f64 {
        self.core.control().advances() as f64
    }

    /// # Errors
    /// Returns an error if the context cannot be converted.
    pub fn snapshot(&self) -> Result<JsValue, JsValue> {
        to_js(&self.core.control().snapshot())
    }

    /// # Errors
    /// Returns an error if the settings cannot be converted.
    pub fn settings(&self) -> Result<JsValue, JsValue> {
        to_js(&self.core.settings())
    }

    /// # Errors
    /// Returns an error if `value` is not a valid settings object.
    #[wasm_bindgen(js_name = setSettings)]
    pub fn set_settings(&self, value: JsValue) -> Result<(), JsValue> {
        let settings: Settings = serde_wasm_bindgen::from_value(value).map_err(ClientError::from)?;
        self.core.set_settings(settings);
        Ok(())
    }

    #[wasm_bindgen(js_name = setFollowCurrentAdvance)]
    pub fn set_follow_current_advance(&self, follow: bool) {
        self.core.control().set_follow_current_advance(follow);
    }

    /// # Errors
    /// Returns an error if the filters cannot be converted.
    pub fn filters(&self) -> Result<JsValue, JsValue> {
        to_js(&self.core.filters())
    }

    /// # Errors
    /// Returns an error for an unknown filter or option.
    #[wasm_bindgen(js_name = selectFilter)]
    pub fn select_filter(&self, kind: &str, index: u8) -> Result<JsValue, JsValue> {
        to_js(&self.core.select_filter(kind, index)?)
    }

    /// # Errors
    /// Returns an error for an unknown filter.
    #[wasm_bindgen(js_name = deselectFilter)]
    pub fn deselect_filter(&self, kind: &str, index: u8) -> Result<JsValue, JsValue> {
        to_js(&self.core.deselect_filter(kind, index)?)
    }

    /// # Errors
    /// Returns an error for an unknown filter or option.
    #[wasm_bindgen(js_name = setFilter)]
    pub fn set_filter(&self, kind: &str, indices: Vec<u8>) -> Result<JsValue, JsValue> {
        to_js(&self.core.set_filter(kind, &indices)?)
    }

    /// # Errors
    /// Returns an error if `stat` is not a stat slot.
    #[wasm_bindgen(js_name = setIvRange)]
    pub fn set_iv_range(&self, stat: usize, min: u8, max: u8) -> Result<JsValue, JsValue> {
        to_js(&self.core.set_iv_range(stat, min, max)?)
    }

    #[wasm_bindgen(js_name = clearFilters)]
    pub fn clear_filters(&self) {
        self.core.clear_filters();
    }

    /// Option indices currently selected for one filter.
    ///
    /// # Errors
    /// Returns an error for an unknown filter.
    #[wasm_bindgen(js_name = selectedFilter)]
    pub fn selected_filter(&self, kind: &str) -> Result<Vec<u8>, JsValue> {
        Ok(self.core.selected_filter(kind)?)
    }

    /// # Errors
    /// Returns an error for an unknown filter.
    #[wasm_bindgen(js_name = filterOptions)]
    pub fn filter_options(kind: &str) -> Result<JsValue, JsValue> {
        to_js(filter_options(kind)?)
    }

    #[wasm_bindgen(js_name = selectSpawner)]
    pub fn select_spawner(&self, index: Option<usize>) {
        self.core.select_spawner(index);
    }

    /// What the selected spawner offers under the current mode and weather,
    /// or `undefined` when nothing is selected.
    ///
    /// # Errors
    /// Returns an error if the summary cannot be converted.
    #[wasm_bindgen(js_name = spawnerSummary)]
    pub fn spawner_summary(&self) -> Result<JsValue, JsValue> {
        to_js(&self.core.spawner_summary())
    }

    /// # Errors
    /// Returns an error if the engine is not loaded or generation fails.
    pub fn generate(&self) -> Result<JsValue, JsValue> {
        to_js(&self.core.generate()?)
    }

    /// # Errors
    /// Returns an error if the results cannot be converted.
    pub fn results(&self) -> Result<JsValue, JsValue> {
        to_js(&self.core.results())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overworld_core::engine::{Address, EngineError};
    use overworld_core::{EncounterType, Weather};

    /// Engine that must never be reached from the paths under test.
    struct Unreachable;

    impl Engine for Unreachable {
        fn allocate_bytes(&self, size: u32) -> Result<Address, EngineError> {
            Err(EngineError::AllocationFailed { size })
        }
        fn delete_bytes(&self, _address: Address) {}
        fn memory_size(&self) -> usize {
            0
        }
        fn write_memory(&self, address: Address, bytes: &[u8]) -> Result<(), EngineError> {
            Err(EngineError::OutOfBounds {
                address,
                len: bytes.len(),
                memory: 0,
            })
        }
        fn read_memory(&self, address: Address, len: usize) -> Result<Vec<u8>, EngineError> {
            Err(EngineError::OutOfBounds {
                address,
                len,
                memory: 0,
            })
        }
        fn xoroshiro(&self, _state: Address) -> Result<Address, EngineError> {
            Err(EngineError::MissingExport("xoroshiro"))
        }
        fn xoroshiro_update(&self, _handle: Address, _observed: Address) -> Result<u64, EngineError> {
            Err(EngineError::MissingExport("xoroshiroUpdate"))
        }
        fn generate_slots(
            &self,
            _settings: Address,
            _filters: Address,
            _slot_table: Address,
            _state: Address,
        ) -> Result<Address, EngineError> {
            Err(EngineError::MissingExport("generateSlots"))
        }
        fn generate_gimmicks(
            &self,
            _settings: Address,
            _filters: Address,
            _gimmick_spec: Address,
            _state: Address,
        ) -> Result<Address, EngineError> {
            Err(EngineError::MissingExport("generateGimmicks"))
        }
    }

    fn core() -> ClientCore<Unreachable> {
        ClientCore::new(ClientConfig::default()).unwrap()
    }

    #[test]
    fn generate_requires_an_engine() {
        let core = core();
        assert!(matches!(core.generate(), Err(ClientError::EngineNotLoaded)));
        core.attach_engine(Unreachable);
        assert!(core.engine_loaded());
        assert!(core.generate().unwrap().is_empty());
        assert!(core.results().is_empty());
    }

    #[test]
    fn filter_edits_recompile_the_wire_form() {
        let core = core();
        assert_eq!(core.select_filter("natures", 3).unwrap().natures, 1 << 3);
        assert_eq!(core.select_filter("marks", 33).unwrap().marks, [0, 2]);
        assert_eq!(core.deselect_filter("natures", 3).unwrap().natures, 0);
        assert_eq!(core.set_filter("genders", &[1, 3]).unwrap().genders, 0b1010);
        assert_eq!(core.set_iv_range(2, 20, 40).unwrap().iv_max[2], 31);
        core.select_filter("natures", 10).unwrap();
        assert_eq!(core.selected_filter("Natures").unwrap(), [10]);
        assert_eq!(core.selected_filter("marks").unwrap(), [33]);
        assert!(matches!(
            core.selected_filter("colour"),
            Err(ClientError::UnknownFilter(_))
        ));
        assert!(matches!(
            core.select_filter("weather", 0),
            Err(ClientError::UnknownFilter(_))
        ));
        assert!(matches!(
            core.select_filter("abilities", 0),
            Err(ClientError::Filter(_))
        ));

        core.clear_filters();
        assert_eq!(core.filters(), Filters::default());
        assert_eq!(core.iv_range(), IvRange::default());
        assert!(core.selected_filter("natures").unwrap().is_empty());
    }

    #[test]
    fn spawner_summary_needs_a_loaded_selection() {
        let core = core();
        assert_eq!(core.spawner_summary(), None);
        core.select_spawner(Some(0));
        assert_eq!(core.selected_spawner(), Some(0));
        assert_eq!(core.spawner_summary(), None);
    }

    #[test]
    fn settings_round_trip_through_the_control() {
        let core = core();
        let mut settings = core.settings();
        settings.encounter_type = EncounterType::Symbol;
        settings.weather = Weather::Mist;
        core.set_settings(settings.clone());
        assert_eq!(core.control().snapshot().settings, settings);
    }

    #[test]
    fn session_needs_engine_and_idle_loop() {
        struct Never;
        #[async_trait::async_trait(?Send)]
        impl Pause for Never {
            async fn pause(&self, _duration: std::time::Duration) {}
        }

        let core = core();
        let endpoint = HttpEndpoint::new("/api");
        assert!(matches!(
            core.session(endpoint.clone(), Never),
            Err(ClientError::EngineNotLoaded)
        ));
        core.attach_engine(Unreachable);
        core.set_polling(true);
        assert!(matches!(core.session(endpoint.clone(), Never), Err(ClientError::Busy)));
        core.set_polling(false);
        assert!(core.session(endpoint, Never).is_ok());
    }

    #[test]
    fn option_tables_and_state_labels() {
        assert_eq!(filter_options("scales").unwrap().len(), 3);
        assert_eq!(filter_options("Marks").unwrap().len(), 45);
        assert!(filter_options("items").is_err());
        assert_eq!(state_label(ConnectionState::Connecting), "connecting");
    }
}
