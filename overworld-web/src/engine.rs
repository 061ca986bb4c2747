//! [`Engine`] over a `WebAssembly.Instance` in the browser.
//!
//! The host supplies `env.memory` (two initial pages) and answers every other
//! function import the module declares with an inert stub returning zero.
//! WASI imports are the exception: their stubs throw, so a call the host
//! cannot honour surfaces as a trap. The module's own `memory` export, if it
//! has one, takes precedence. Memory views
//! are created per access because the underlying buffer is replaced whenever
//! the module grows its memory.

use crate::dom;
use js_sys::{Array, ArrayBuffer, Function, Object, Reflect, Uint8Array, WebAssembly};
use overworld_core::engine::{Address, Engine, EngineError, check_range};
use thiserror::Error;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

const INITIAL_PAGES: u32 = 2;
const WASI_NAMESPACE: &str = "wasi_snapshot_preview1";
const SEARCH_LIMIT: u64 = overworld_core::shadow::ENGINE_SEARCH_LIMIT;

#[derive(Debug, Error)]
pub enum EngineLoadError {
    #[error("could not fetch engine module from {url}: {message}")]
    Fetch { url: String, message: String },
    #[error("engine module answered HTTP {status}")]
    Status { status: u16 },
    #[error("could not compile engine module: {0}")]
    Compile(String),
    #[error("could not instantiate engine module: {0}")]
    Instantiate(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

struct Exports {
    allocate_bytes: Function,
    delete_bytes: Function,
    xoroshiro: Function,
    xoroshiro_update: Function,
    generate_slots: Function,
    generate_gimmicks: Function,
}

impl Exports {
    fn resolve(exports: &Object) -> Result<Self, EngineError> {
        let function = |name: &'static str| -> Result<Function, EngineError> {
            Reflect::get(exports, &JsValue::from_str(name))
                .ok()
                .and_then(|value| value.dyn_into::<Function>().ok())
                .ok_or(EngineError::MissingExport(name))
        };
        Ok(Self {
            allocate_bytes: function("allocateBytes")?,
            delete_bytes: function("deleteBytes")?,
            xoroshiro: function("xoroshiro")?,
            xoroshiro_update: function("xoroshiroUpdate")?,
            generate_slots: function("generateSlots")?,
            generate_gimmicks: function("generateGimmicks")?,
        })
    }
}

pub struct WasmEngine {
    memory: WebAssembly::Memory,
    exports: Exports,
}

impl WasmEngine {
    /// Fetch, compile and instantiate the engine module at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails or a required export is missing.
    #[allow(clippy::future_not_send)] // Wasm futures rely on `JsFuture`, which is not `Send`.
    pub async fn load(url: &str) -> Result<Self, EngineLoadError> {
        let fetch_error = |err: JsValue| EngineLoadError::Fetch {
            url: url.to_string(),
            message: dom::js_error_message(&err),
        };
        let response = dom::fetch_response(url).await.map_err(fetch_error)?;
        if !response.ok() {
            return Err(EngineLoadError::Status {
                status: response.status(),
            });
        }
        let buffer = JsFuture::from(response.array_buffer().map_err(fetch_error)?)
            .await
            .map_err(fetch_error)?;

        let module: WebAssembly::Module = JsFuture::from(WebAssembly::compile(&buffer))
            .await
            .map_err(|err| EngineLoadError::Compile(dom::js_error_message(&err)))?
            .unchecked_into();
        let instantiate = |err: JsValue| EngineLoadError::Instantiate(dom::js_error_message(&err));

        let memory = host_memory().map_err(instantiate)?;
        let imports = host_imports(&module, &memory).map_err(instantiate)?;
        let instance: WebAssembly::Instance =
            JsFuture::from(WebAssembly::instantiate_module(&module, &imports))
                .await
                .map_err(instantiate)?
                .unchecked_into();

        let exports = instance.exports();
        let memory = Reflect::get(&exports, &JsValue::from_str("memory"))
            .ok()
            .and_then(|value| value.dyn_into::<WebAssembly::Memory>().ok())
            .unwrap_or(memory);
        let engine = Self {
            exports: Exports::resolve(&exports)?,
            memory,
        };
        log::info!(
            "engine loaded from {url} ({} bytes of memory)",
            engine.memory_size()
        );
        Ok(engine)
    }

    fn buffer(&self) -> ArrayBuffer {
        self.memory.buffer().unchecked_into()
    }

    fn call(
        entry: &'static str,
        function: &Function,
        args: &[JsValue],
    ) -> Result<JsValue, EngineError> {
        let args: Array = args.iter().collect();
        function
            .apply(&JsValue::NULL, &args)
            .map_err(|err| EngineError::Trap {
                entry,
                message: dom::js_error_message(&err),
            })
    }

    fn call_address(
        entry: &'static str,
        function: &Function,
        args: &[JsValue],
    ) -> Result<Address, EngineError> {
        let value = Self::call(entry, function, args)?;
        to_address(&value).ok_or_else(|| EngineError::Trap {
            entry,
            message: format!("expected an address, got {value:?}"),
        })
    }
}

fn host_memory() -> Result<WebAssembly::Memory, JsValue> {
    let descriptor = Object::new();
    Reflect::set(
        &descriptor,
        &JsValue::from_str("initial"),
        &JsValue::from(INITIAL_PAGES),
    )?;
    WebAssembly::Memory::new(&descriptor)
}

fn host_imports(module: &WebAssembly::Module, memory: &WebAssembly::Memory) -> Result<Object, JsValue> {
    let imports = Object::new();
    let env = Object::new();
    Reflect::set(&env, &JsValue::from_str("memory"), memory)?;
    Reflect::set(&imports, &JsValue::from_str("env"), &env)?;

    for descriptor in WebAssembly::Module::imports(module).iter() {
        let field = |key: &str| {
            Reflect::get(&descriptor, &JsValue::from_str(key))
                .ok()
                .and_then(|v| v.as_string())
                .unwrap_or_default()
        };
        let (namespace, name, kind) = (field("module"), field("name"), field("kind"));
        if kind != "function" {
            continue;
        }
        let target = match Reflect::get(&imports, &JsValue::from_str(&namespace)) {
            Ok(existing) if existing.is_object() => existing.unchecked_into::<Object>(),
            _ => {
                let created = Object::new();
                Reflect::set(&imports, &JsValue::from_str(&namespace), &created)?;
                created
            }
        };
        if namespace == WASI_NAMESPACE {
            log::warn!("engine imports {namespace}.{name}; calls to it will trap");
        } else {
            log::debug!("stubbing engine import {namespace}.{name}");
        }
        Reflect::set(
            &target,
            &JsValue::from_str(&name),
            &Function::new_no_args(&stub_body(&namespace, &name)),
        )?;
    }
    Ok(imports)
}

fn stub_body(namespace: &str, name: &str) -> String {
    if namespace == WASI_NAMESPACE {
        let message = format!("unsupported host call {namespace}.{name}");
        format!("throw new Error({message:?});")
    } else {
        "return 0;".to_string()
    }
}

/// Addresses arrive as JS numbers; anything else is a protocol error.
fn to_address(value: &JsValue) -> Option<Address> {
    address_from_number(value.as_f64()?)
}

/// Exports return `i32`, so addresses in the upper half of the 32-bit space
/// show up negative and are reinterpreted as unsigned.
fn address_from_number(number: f64) -> Option<Address> {
    if number.fract() != 0.0 || !(-2_147_483_648.0..=f64::from(u32::MAX)).contains(&number) {
        return None;
    }
    let wide = number as i64;
    Address::try_from(if wide < 0 { wide + (1_i64 << 32) } else { wide }).ok()
}

/// Step counts may arrive as a number or a `BigInt`. Negative values mean
/// the engine gave up, which is reported as its full search distance.
fn to_advance_count(value: &JsValue) -> Option<u64> {
    if value.is_bigint() {
        let text: String = value
            .clone()
            .unchecked_into::<js_sys::BigInt>()
            .to_string(10)
            .ok()?
            .into();
        return Some(text.parse::<u64>().unwrap_or(SEARCH_LIMIT));
    }
    let number = value.as_f64()?;
    if number < 0.0 {
        return Some(SEARCH_LIMIT);
    }
    Some(number as u64)
}

impl Engine for WasmEngine {
    fn allocate_bytes(&self, size: u32) -> Result<Address, EngineError> {
        let address =
            Self::call_address("allocateBytes", &self.exports.allocate_bytes, &[size.into()])?;
        if address == 0 {
            return Err(EngineError::AllocationFailed { size });
        }
        Ok(address)
    }

    fn delete_bytes(&self, address: Address) {
        if let Err(err) = Self::call("deleteBytes", &self.exports.delete_bytes, &[address.into()]) {
            log::error!("{err}");
        }
    }

    fn memory_size(&self) -> usize {
        self.buffer().byte_length() as usize
    }

    fn write_memory(&self, address: Address, bytes: &[u8]) -> Result<(), EngineError> {
        let buffer = self.buffer();
        check_range(address, bytes.len(), buffer.byte_length() as usize)?;
        let len = u32::try_from(bytes.len()).map_err(|_| EngineError::OutOfBounds {
            address,
            len: bytes.len(),
            memory: buffer.byte_length() as usize,
        })?;
        Uint8Array::new_with_byte_offset_and_length(&buffer, address, len).copy_from(bytes);
        Ok(())
    }

    fn read_memory(&self, address: Address, len: usize) -> Result<Vec<u8>, EngineError> {
        let buffer = self.buffer();
        let memory = buffer.byte_length() as usize;
        check_range(address, len, memory)?;
        let view_len = u32::try_from(len).map_err(|_| EngineError::OutOfBounds {
            address,
            len,
            memory,
        })?;
        Ok(Uint8Array::new_with_byte_offset_and_length(&buffer, address, view_len).to_vec())
    }

    fn xoroshiro(&self, state: Address) -> Result<Address, EngineError> {
        Self::call_address("xoroshiro", &self.exports.xoroshiro, &[state.into()])
    }

    fn xoroshiro_update(&self, handle: Address, observed: Address) -> Result<u64, EngineError> {
        let value = Self::call(
            "xoroshiroUpdate",
            &self.exports.xoroshiro_update,
            &[handle.into(), observed.into()],
        )?;
        to_advance_count(&value).ok_or_else(|| EngineError::Trap {
            entry: "xoroshiroUpdate",
            message: format!("expected a step count, got {value:?}"),
        })
    }

    fn generate_slots(
        &self,
        settings: Address,
        filters: Address,
        slot_table: Address,
        state: Address,
    ) -> Result<Address, EngineError> {
        Self::call_address(
            "generateSlots",
            &self.exports.generate_slots,
            &[settings.into(), filters.into(), slot_table.into(), state.into()],
        )
    }

    fn generate_gimmicks(
        &self,
        settings: Address,
        filters: Address,
        gimmick_spec: Address,
        state: Address,
    ) -> Result<Address, EngineError> {
        Self::call_address(
            "generateGimmicks",
            &self.exports.generate_gimmicks,
            &[settings.into(), filters.into(), gimmick_spec.into(), state.into()],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_i32_returns_are_high_addresses() {
        assert_eq!(address_from_number(0.0), Some(0));
        assert_eq!(address_from_number(65_536.0), Some(65_536));
        assert_eq!(address_from_number(-1.0), Some(u32::MAX));
        assert_eq!(address_from_number(-2_147_483_648.0), Some(0x8000_0000));
        assert_eq!(address_from_number(f64::from(u32::MAX)), Some(u32::MAX));
    }

    #[test]
    fn non_addresses_are_rejected() {
        assert_eq!(address_from_number(1.5), None);
        assert_eq!(address_from_number(-2_147_483_649.0), None);
        assert_eq!(address_from_number(4_294_967_296.0), None);
        assert_eq!(address_from_number(f64::NAN), None);
    }

    #[test]
    fn wasi_stubs_throw_and_others_return_zero() {
        assert_eq!(stub_body("env", "emscripten_notify_memory_growth"), "return 0;");
        let body = stub_body(WASI_NAMESPACE, "fd_write");
        assert!(body.starts_with("throw new Error("));
        assert!(body.contains("wasi_snapshot_preview1.fd_write"));
    }
}
