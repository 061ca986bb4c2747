//! HTTP client for the remote process endpoint.

use crate::dom;
use async_trait::async_trait;
use overworld_core::{Charms, PlayerPosition, RemoteEndpoint, RemoteError, RngState, Spawner};
use serde::Serialize;
use serde::de::DeserializeOwned;
use wasm_bindgen::JsValue;
use web_sys::{Headers, Request, RequestInit, Response};

#[derive(Serialize)]
struct ConnectBody<'a> {
    ip: &'a str,
}

/// [`RemoteEndpoint`] speaking to the HTTP routes under `base`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpEndpoint {
    base: String,
}

impl HttpEndpoint {
    #[must_use]
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    #[must_use]
    pub fn url(&self, route: &str) -> String {
        format!("{}/{route}", self.base)
    }

    #[allow(clippy::future_not_send)]
    async fn send(
        &self,
        route: &'static str,
        request: Result<Request, JsValue>,
    ) -> Result<Response, RemoteError> {
        let request_error = |err: JsValue| RemoteError::Request {
            endpoint: route,
            message: dom::js_error_message(&err),
        };
        let response = dom::fetch_request(&request.map_err(request_error)?)
            .await
            .map_err(request_error)?;
        check_status(route, response.status())?;
        Ok(response)
    }

    #[allow(clippy::future_not_send)]
    async fn get(&self, route: &'static str) -> Result<Response, RemoteError> {
        self.send(route, Request::new_with_str(&self.url(route)))
            .await
    }

    #[allow(clippy::future_not_send)]
    async fn get_json<T: DeserializeOwned>(&self, route: &'static str) -> Result<T, RemoteError> {
        let response = self.get(route).await?;
        let text = dom::response_text(&response)
            .await
            .map_err(|err| decode_error(route, &dom::js_error_message(&err)))?;
        parse_json(route, &text)
    }
}

fn check_status(route: &'static str, status: u16) -> Result<(), RemoteError> {
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(RemoteError::Status {
            endpoint: route,
            status,
        })
    }
}

fn decode_error(route: &'static str, message: &str) -> RemoteError {
    RemoteError::Decode {
        endpoint: route,
        message: message.to_string(),
    }
}

fn parse_json<T: DeserializeOwned>(route: &'static str, text: &str) -> Result<T, RemoteError> {
    serde_json::from_str(text).map_err(|err| decode_error(route, &err.to_string()))
}

fn parse_rng_state(bytes: &[u8]) -> Result<RngState, RemoteError> {
    RngState::from_le_bytes(bytes).map_err(|err| decode_error("rng-state", &err.to_string()))
}

fn post_json(url: &str, body: &str) -> Result<Request, JsValue> {
    let headers = Headers::new()?;
    headers.set("Content-Type", "application/json")?;
    let init = RequestInit::new();
    init.set_method("POST");
    init.set_headers(&headers);
    init.set_body(&JsValue::from_str(body));
    Request::new_with_str_and_init(url, &init)
}

#[async_trait(?Send)]
impl RemoteEndpoint for HttpEndpoint {
    async fn connect(&self, address: &str) -> Result<(), RemoteError> {
        let body = serde_json::to_string(&ConnectBody { ip: address })
            .map_err(|err| decode_error("connect", &err.to_string()))?;
        self.send("connect", post_json(&self.url("connect"), &body))
            .await
            .map(|_| ())
    }

    async fn disconnect(&self) -> Result<(), RemoteError> {
        self.get("disconnect").await.map(|_| ())
    }

    async fn rng_state(&self) -> Result<RngState, RemoteError> {
        let response = self.get("rng-state").await?;
        let bytes = dom::response_bytes(&response)
            .await
            .map_err(|err| decode_error("rng-state", &dom::js_error_message(&err)))?;
        parse_rng_state(&bytes)
    }

    async fn tidsid(&self) -> Result<u32, RemoteError> {
        self.get_json("tidsid").await
    }

    async fn charms(&self) -> Result<Charms, RemoteError> {
        self.get_json("charms").await
    }

    async fn current_weather(&self) -> Result<u8, RemoteError> {
        self.get_json("current-weather").await
    }

    async fn loaded_spawners(&self) -> Result<Vec<Spawner>, RemoteError> {
        self.get_json("loaded-spawners").await
    }

    async fn player_position(&self) -> Result<PlayerPosition, RemoteError> {
        self.get_json("player-position").await
    }
}
