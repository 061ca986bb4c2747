//! Connection lifecycle and the cooperative poll loop.
//!
//! Everything here runs on one flow of control. Shared state lives behind
//! [`SessionControl`], a cheap `Rc` handle the UI keeps so it can read the
//! current context and request a disconnect while the loop is suspended. No
//! borrow of that state is ever held across an `.await`.

use crate::bridge::{BridgeError, MemoryBridge};
use crate::config::{ConfigError, SessionConfig};
use crate::engine::Engine;
use crate::generate::{Baseline, GenerateError, generate_from_baseline};
use crate::model::{
    Charms, EncounterSummary, EncounterTemplate, Filters, OverworldSpec, PlayerPosition, RngState,
    Settings, Spawner, SpawnerSummary, Weather,
};
use crate::shadow::{ShadowTracker, ShadowUpdate};
use async_trait::async_trait;
use futures::future::{Either, select};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, Ref, RefCell};
use std::rc::Rc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("request to `{endpoint}` failed: {message}")]
    Request {
        endpoint: &'static str,
        message: String,
    },
    #[error("`{endpoint}` answered HTTP {status}")]
    Status { endpoint: &'static str, status: u16 },
    #[error("could not decode `{endpoint}` response: {message}")]
    Decode {
        endpoint: &'static str,
        message: String,
    },
    #[error("remote call timed out")]
    Timeout,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a session is already connecting or connected")]
    AlreadyActive,
    #[error("connect rejected: {0}")]
    ConnectRejected(#[source] RemoteError),
    #[error("could not read the initial rng state: {0}")]
    Handshake(#[source] RemoteError),
    #[error("disconnect requested while connecting")]
    Cancelled,
    #[error(transparent)]
    Engine(#[from] BridgeError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// The remote process the session observes.
#[async_trait(?Send)]
pub trait RemoteEndpoint {
    async fn connect(&self, address: &str) -> Result<(), RemoteError>;
    async fn disconnect(&self) -> Result<(), RemoteError>;
    async fn rng_state(&self) -> Result<RngState, RemoteError>;
    async fn tidsid(&self) -> Result<u32, RemoteError>;
    async fn charms(&self) -> Result<Charms, RemoteError>;
    async fn current_weather(&self) -> Result<u8, RemoteError>;
    async fn loaded_spawners(&self) -> Result<Vec<Spawner>, RemoteError>;
    async fn player_position(&self) -> Result<PlayerPosition, RemoteError>;
}

/// Suspends the flow for a fixed time (a browser timer, a tokio sleep).
#[async_trait(?Send)]
pub trait Pause {
    async fn pause(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Everything the session has learned about the remote process.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    /// Cumulative advances since connect.
    pub advances: u64,
    pub baseline: Option<Baseline>,
    pub settings: Settings,
    /// Copy `advances` into `settings.min_advance` on every tick.
    pub follow_current_advance: bool,
    pub spawners: Vec<Spawner>,
    pub player_position: Option<PlayerPosition>,
    pub last_state: Option<RngState>,
}

impl SessionContext {
    /// Generate from the current baseline with the current settings.
    ///
    /// Before the first successful connect there is no baseline and the
    /// result is empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine call fails.
    pub fn generate<E: Engine>(
        &self,
        bridge: &MemoryBridge<E>,
        filters: &Filters,
        template: Option<&EncounterTemplate>,
    ) -> Result<Vec<OverworldSpec>, GenerateError> {
        match self.baseline {
            Some(baseline) => generate_from_baseline(bridge, &self.settings, filters, template, baseline),
            None => Ok(Vec::new()),
        }
    }

    /// Template of the spawner at `index` for the active mode and weather.
    #[must_use]
    pub fn template_for(&self, index: usize) -> Option<EncounterTemplate> {
        self.spawners
            .get(index)
            .and_then(|s| s.template(self.settings.encounter_type, self.settings.weather))
    }

    #[must_use]
    pub fn spawner_summary(&self, index: usize) -> Option<SpawnerSummary> {
        let spawner = self.spawners.get(index)?;
        Some(SpawnerSummary {
            index,
            distance: self.player_position.as_ref().map(|p| spawner.planar_distance(p)),
            spawn_radius: spawner.spawn_radius,
            encounter: self.template_for(index).as_ref().map(EncounterSummary::from),
        })
    }

    fn record(&mut self, update: ShadowUpdate, state: RngState) {
        match update {
            ShadowUpdate::Advanced(n) => self.advances = self.advances.saturating_add(n),
            ShadowUpdate::Initialized | ShadowUpdate::Resynced => {
                self.baseline = Some(Baseline {
                    state,
                    advance: self.advances,
                });
            }
        }
        self.last_state = Some(state);
        if self.follow_current_advance {
            self.settings.min_advance = u32::try_from(self.advances).unwrap_or(u32::MAX);
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Cell<ConnectionState>,
    context: RefCell<SessionContext>,
}

/// Handle the UI uses to observe and steer a running session.
#[derive(Debug, Clone, Default)]
pub struct SessionControl {
    shared: Rc<Shared>,
}

impl SessionControl {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.state.get()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Ask the poll loop to stop. It finishes any in-flight remote call,
    /// discards its result, then notifies the endpoint.
    pub fn request_disconnect(&self) {
        if self.state() != ConnectionState::Disconnected {
            log::info!("disconnect requested");
        }
        self.set_state(ConnectionState::Disconnected);
    }

    #[must_use]
    pub fn advances(&self) -> u64 {
        self.shared.context.borrow().advances
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionContext {
        self.shared.context.borrow().clone()
    }

    /// Read access for callers that only need a field or two.
    #[must_use]
    pub fn context(&self) -> Ref<'_, SessionContext> {
        self.shared.context.borrow()
    }

    pub fn with_settings_mut<T>(&self, f: impl FnOnce(&mut Settings) -> T) -> T {
        f(&mut self.shared.context.borrow_mut().settings)
    }

    pub fn set_follow_current_advance(&self, follow: bool) {
        let mut context = self.shared.context.borrow_mut();
        context.follow_current_advance = follow;
        if follow {
            context.settings.min_advance = u32::try_from(context.advances).unwrap_or(u32::MAX);
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.shared.state.set(state);
    }

    fn update_context<T>(&self, f: impl FnOnce(&mut SessionContext) -> T) -> T {
        f(&mut self.shared.context.borrow_mut())
    }
}

/// Context pieces a poll iteration may fail to refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextField {
    RngState,
    Weather,
    PlayerPosition,
    Spawners,
}

/// What one poll iteration did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub update: Option<ShadowUpdate>,
    /// Pieces left unchanged because their fetch failed.
    pub stale: Vec<ContextField>,
    /// A disconnect arrived mid-iteration; the rest was skipped.
    pub interrupted: bool,
}

impl TickReport {
    fn interrupted(mut self) -> Self {
        self.interrupted = true;
        self
    }
}

pub struct Session<R: RemoteEndpoint, E: Engine, P: Pause> {
    endpoint: R,
    shadow: ShadowTracker<E>,
    pause: P,
    config: SessionConfig,
    control: SessionControl,
}

impl<R: RemoteEndpoint, E: Engine, P: Pause> Session<R, E, P> {
    /// # Errors
    ///
    /// Returns an error if `config` does not validate.
    pub fn new(
        endpoint: R,
        bridge: MemoryBridge<E>,
        pause: P,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        Ok(Self {
            endpoint,
            shadow: ShadowTracker::with_ceiling(bridge, config.desync_ceiling),
            pause,
            config,
            control: SessionControl::new(),
        })
    }

    /// Share an existing control handle, keeping its settings across sessions.
    #[must_use]
    pub fn with_control(mut self, control: SessionControl) -> Self {
        self.control = control;
        self
    }

    #[must_use]
    pub fn control(&self) -> SessionControl {
        self.control.clone()
    }

    #[must_use]
    pub const fn endpoint(&self) -> &R {
        &self.endpoint
    }

    #[must_use]
    pub const fn shadow(&self) -> &ShadowTracker<E> {
        &self.shadow
    }

    /// Connect, then run the onConnect handshake.
    ///
    /// # Errors
    ///
    /// A rejected or timed-out connect leaves the session Disconnected with no
    /// other side effects. A failed handshake tears the session down again.
    pub async fn connect(&mut self, address: &str) -> Result<(), SessionError> {
        if self.control.state() != ConnectionState::Disconnected {
            return Err(SessionError::AlreadyActive);
        }
        self.control.set_state(ConnectionState::Connecting);
        log::info!("connecting to {address}");

        let outcome = match select(
            self.endpoint.connect(address),
            self.pause.pause(self.config.connect_timeout()),
        )
        .await
        {
            Either::Left((result, _)) => result,
            Either::Right(((), _)) => Err(RemoteError::Timeout),
        };
        if let Err(err) = outcome {
            log::warn!("connect to {address} failed: {err}");
            self.control.set_state(ConnectionState::Disconnected);
            return Err(SessionError::ConnectRejected(err));
        }
        if self.control.state() != ConnectionState::Connecting {
            self.notify_disconnect().await;
            return Err(SessionError::Cancelled);
        }

        self.control.set_state(ConnectionState::Connected);
        self.on_connect().await
    }

    async fn on_connect(&mut self) -> Result<(), SessionError> {
        let fetched = self.endpoint.rng_state().await;
        if !self.control.is_connected() {
            self.notify_disconnect().await;
            return Err(SessionError::Cancelled);
        }
        let initialized = fetched
            .map_err(SessionError::Handshake)
            .and_then(|state| {
                self.shadow.initialize(state)?;
                Ok(state)
            });
        let state = match initialized {
            Ok(state) => state,
            Err(err) => {
                log::error!("handshake failed: {err}");
                self.control.set_state(ConnectionState::Disconnected);
                self.notify_disconnect().await;
                return Err(err);
            }
        };
        self.control.update_context(|ctx| {
            ctx.advances = 0;
            ctx.baseline = Some(Baseline { state, advance: 0 });
            ctx.last_state = Some(state);
            if ctx.follow_current_advance {
                ctx.settings.min_advance = 0;
            }
        });
        log::info!("connected, shadow rng seeded from {state:x?}");

        let tidsid = self.endpoint.tidsid().await;
        if !self.control.is_connected() {
            return Ok(());
        }
        match tidsid {
            Ok(tidsid) => self.control.with_settings_mut(|s| s.tidsid = tidsid),
            Err(err) => log::warn!("could not read trainer id: {err}"),
        }

        let charms = self.endpoint.charms().await;
        if !self.control.is_connected() {
            return Ok(());
        }
        match charms {
            Ok(charms) => self.control.with_settings_mut(|s| s.apply_charms(charms)),
            Err(err) => log::warn!("could not read charms: {err}"),
        }

        let spawners = self.endpoint.loaded_spawners().await;
        if !self.control.is_connected() {
            return Ok(());
        }
        match spawners {
            Ok(spawners) => self.control.update_context(|ctx| ctx.spawners = spawners),
            Err(err) => log::warn!("could not read loaded spawners: {err}"),
        }
        Ok(())
    }

    /// Run one poll iteration.
    ///
    /// Connection state is re-checked after every remote call; once a
    /// disconnect has been requested the call's result is dropped and no
    /// further call is issued.
    pub async fn poll_once(&mut self) -> TickReport {
        let mut report = TickReport::default();

        let fetched = self.endpoint.rng_state().await;
        if !self.control.is_connected() {
            return report.interrupted();
        }
        match fetched {
            Ok(state) => match self.shadow.update(state) {
                Ok(update) => {
                    self.control.update_context(|ctx| ctx.record(update, state));
                    report.update = Some(update);
                }
                Err(err) => {
                    log::error!("shadow rng update failed: {err}");
                    report.stale.push(ContextField::RngState);
                }
            },
            Err(err) => {
                log::warn!("rng state unavailable this tick: {err}");
                report.stale.push(ContextField::RngState);
            }
        }

        let weather = self.endpoint.current_weather().await;
        if !self.control.is_connected() {
            return report.interrupted();
        }
        match weather.map(Weather::try_from) {
            Ok(Ok(weather)) => self.control.with_settings_mut(|s| s.weather = weather),
            Ok(Err(err)) => {
                log::warn!("{err}");
                report.stale.push(ContextField::Weather);
            }
            Err(err) => {
                log::warn!("weather unavailable this tick: {err}");
                report.stale.push(ContextField::Weather);
            }
        }

        let position = self.endpoint.player_position().await;
        if !self.control.is_connected() {
            return report.interrupted();
        }
        match position {
            Ok(position) => self
                .control
                .update_context(|ctx| ctx.player_position = Some(position)),
            Err(err) => {
                log::warn!("player position unavailable this tick: {err}");
                report.stale.push(ContextField::PlayerPosition);
            }
        }

        let spawners = self.endpoint.loaded_spawners().await;
        if !self.control.is_connected() {
            return report.interrupted();
        }
        match spawners {
            Ok(spawners) => self.control.update_context(|ctx| ctx.spawners = spawners),
            Err(err) => {
                log::warn!("spawners unavailable this tick: {err}");
                report.stale.push(ContextField::Spawners);
            }
        }

        report
    }

    /// Poll until disconnected, pausing between iterations, then notify the
    /// endpoint. An iteration never starts before the previous one finished.
    pub async fn poll_loop(&mut self) {
        while self.control.is_connected() {
            let report = self.poll_once().await;
            log::debug!(
                "tick: {:?}, advances {}, stale {:?}",
                report.update,
                self.control.advances(),
                report.stale
            );
            if report.interrupted {
                break;
            }
            self.pause.pause(self.config.poll_interval()).await;
        }
        self.notify_disconnect().await;
    }

    /// Connect and poll until disconnected.
    ///
    /// # Errors
    ///
    /// Returns the connect or handshake error; polling itself never fails.
    pub async fn run(&mut self, address: &str) -> Result<(), SessionError> {
        self.connect(address).await?;
        self.poll_loop().await;
        Ok(())
    }

    async fn notify_disconnect(&self) {
        log::info!("session closed");
        if let Err(err) = self.endpoint.disconnect().await {
            log::warn!("endpoint did not acknowledge disconnect: {err}");
        }
    }
}
