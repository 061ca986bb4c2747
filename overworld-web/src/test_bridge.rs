//! `window.__overworldTest`, installed only when the page URL has `test=1`.
//!
//! Browser scenarios drive the client through these functions instead of the
//! page's UI.

use crate::client::{ClientCore, connect_promise, filter_options, state_label, to_js};
use crate::dom;
use crate::engine::WasmEngine;
use js_sys::{Object, Reflect};
use serde::Serialize;
use std::rc::{Rc, Weak};
use wasm_bindgen::prelude::*;

type Core = ClientCore<WasmEngine>;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BridgeState {
    state: &'static str,
    engine_loaded: bool,
    polling: bool,
    advances: u64,
    spawners: usize,
    selected_spawner: Option<usize>,
    results: usize,
}

fn bridge_state(core: &Core) -> BridgeState {
    let context = core.control().context();
    BridgeState {
        state: state_label(core.control().state()),
        engine_loaded: core.engine_loaded(),
        polling: core.is_polling(),
        advances: context.advances,
        spawners: context.spawners.len(),
        selected_spawner: core.selected_spawner(),
        results: core.results().len(),
    }
}

fn detached() -> JsValue {
    js_sys::Error::new("client has been dropped").into()
}

fn upgrade(weak: &Weak<Core>) -> Result<Rc<Core>, JsValue> {
    weak.upgrade().ok_or_else(detached)
}

fn set(target: &Object, name: &str, function: &JsValue) {
    let _ = Reflect::set(target, &JsValue::from_str(name), function);
}

pub fn install(core: &Rc<Core>) {
    if !dom::test_mode_enabled() {
        return;
    }
    let Ok(window) = dom::window() else {
        return;
    };
    let bridge = Object::new();

    let weak = Rc::downgrade(core);
    let state = Closure::<dyn Fn() -> Result<JsValue, JsValue>>::new(move || {
        to_js(&bridge_state(&upgrade(&weak)?))
    });
    set(&bridge, "state", state.as_ref());
    state.forget();

    let weak = Rc::downgrade(core);
    let snapshot = Closure::<dyn Fn() -> Result<JsValue, JsValue>>::new(move || {
        to_js(&upgrade(&weak)?.control().snapshot())
    });
    set(&bridge, "snapshot", snapshot.as_ref());
    snapshot.forget();

    let weak = Rc::downgrade(core);
    let connect = Closure::<dyn Fn(String) -> js_sys::Promise>::new(move |address: String| {
        match weak.upgrade() {
            Some(core) => connect_promise(core, address),
            None => js_sys::Promise::reject(&detached()),
        }
    });
    set(&bridge, "connect", connect.as_ref());
    connect.forget();

    let weak = Rc::downgrade(core);
    let disconnect = Closure::<dyn Fn()>::new(move || {
        if let Some(core) = weak.upgrade() {
            core.control().request_disconnect();
        }
    });
    set(&bridge, "disconnect", disconnect.as_ref());
    disconnect.forget();

    let weak = Rc::downgrade(core);
    let select = Closure::<dyn Fn(String, u8) -> Result<JsValue, JsValue>>::new(
        move |kind: String, index: u8| to_js(&upgrade(&weak)?.select_filter(&kind, index)?),
    );
    set(&bridge, "selectFilter", select.as_ref());
    select.forget();

    let weak = Rc::downgrade(core);
    let deselect = Closure::<dyn Fn(String, u8) -> Result<JsValue, JsValue>>::new(
        move |kind: String, index: u8| to_js(&upgrade(&weak)?.deselect_filter(&kind, index)?),
    );
    set(&bridge, "deselectFilter", deselect.as_ref());
    deselect.forget();

    let options = Closure::<dyn Fn(String) -> Result<JsValue, JsValue>>::new(move |kind: String| {
        to_js(filter_options(&kind)?)
    });
    set(&bridge, "filterOptions", options.as_ref());
    options.forget();

    let weak = Rc::downgrade(core);
    let spawner = Closure::<dyn Fn(JsValue)>::new(move |index: JsValue| {
        if let Some(core) = weak.upgrade() {
            core.select_spawner(index.as_f64().map(|i| i as usize));
        }
    });
    set(&bridge, "selectSpawner", spawner.as_ref());
    spawner.forget();

    let weak = Rc::downgrade(core);
    let generate = Closure::<dyn Fn() -> Result<JsValue, JsValue>>::new(move || {
        to_js(&upgrade(&weak)?.generate()?)
    });
    set(&bridge, "generate", generate.as_ref());
    generate.forget();

    set(&window, "__overworldTest", &bridge);
    log::info!("test bridge installed");
}
