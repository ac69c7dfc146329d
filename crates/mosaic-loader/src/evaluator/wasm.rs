//! Sandboxed WASM evaluation of fetched tiles.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use extism::{Manifest, PluginBuilder, Wasm};
use tracing::info;

use mosaic_core::TileMeta;

use super::{TileEvaluator, TileInstance, TileSource};
use crate::api::TileApi;
use crate::error::{LoaderError, LoaderResult};
use crate::resolver::DependencyScope;

/// Default guest execution timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default linear memory cap, in 64KB WASM pages (64MB).
const DEFAULT_MEMORY_MAX_PAGES: u32 = 1024;

/// Evaluates fetched tile payloads as sandboxed WASM modules.
///
/// The guest runs with WASI disabled and can observe its dependency
/// scope only through the injected `dep:<name>` config keys — there is
/// no ambient resolution path for names outside the scope. The module
/// must export `setup`; `teardown` is optional.
pub struct WasmEvaluator {
    timeout: Duration,
    memory_max_pages: u32,
}

impl WasmEvaluator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            memory_max_pages: DEFAULT_MEMORY_MAX_PAGES,
        }
    }

    /// Override the guest execution timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the linear memory cap, in 64KB pages.
    #[must_use]
    pub fn with_memory_max(mut self, pages: u32) -> Self {
        self.memory_max_pages = pages;
        self
    }
}

impl Default for WasmEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TileEvaluator for WasmEvaluator {
    async fn evaluate(
        &self,
        source: TileSource,
        scope: DependencyScope,
    ) -> LoaderResult<Box<dyn TileInstance>> {
        let meta = source.meta.clone();
        let name = meta.name.clone();

        let mut manifest = Manifest::new([Wasm::data(source.payload.bytes.clone())])
            .with_timeout(self.timeout)
            .with_memory_max(self.memory_max_pages);
        for dep in scope.names() {
            let state = if scope.get(dep).is_some_and(|r| !r.is_missing()) {
                "ok"
            } else {
                "missing"
            };
            manifest = manifest.with_config_key(format!("dep:{dep}"), state);
        }

        // Plugin construction compiles the module; do it off the async
        // worker.
        let mut plugin = tokio::task::block_in_place(|| {
            PluginBuilder::new(manifest)
                .with_wasi(false)
                .build()
                .map_err(|e| LoaderError::Evaluate {
                    name: name.clone(),
                    message: format!("failed to instantiate WASM module: {e}"),
                })
        })?;

        if !plugin.function_exists("setup") {
            return Err(LoaderError::Evaluate {
                name,
                message: "module does not export a setup entry point".into(),
            });
        }
        let has_teardown = plugin.function_exists("teardown");

        info!(tile = %name, has_teardown, "Evaluated WASM tile");
        Ok(Box::new(WasmTile {
            meta,
            plugin: Arc::new(Mutex::new(plugin)),
            has_teardown,
        }))
    }
}

/// A live WASM tile instance.
struct WasmTile {
    meta: TileMeta,
    plugin: Arc<Mutex<extism::Plugin>>,
    has_teardown: bool,
}

impl WasmTile {
    fn call_entry(&self, entry: &str) -> Result<(), String> {
        let input = serde_json::json!({
            "name": self.meta.name,
            "version": self.meta.version,
            "basePath": self.meta.base_path,
        })
        .to_string();

        tokio::task::block_in_place(|| {
            let mut plugin = self
                .plugin
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            plugin
                .call::<&str, Vec<u8>>(entry, &input)
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
    }
}

#[async_trait]
impl TileInstance for WasmTile {
    fn meta(&self) -> &TileMeta {
        &self.meta
    }

    async fn setup(&mut self, _api: &mut TileApi) -> LoaderResult<()> {
        self.call_entry("setup").map_err(|message| LoaderError::Setup {
            name: self.meta.name.clone(),
            message,
        })
    }

    async fn teardown(&mut self, _api: &mut TileApi) -> LoaderResult<()> {
        if !self.has_teardown {
            return Ok(());
        }
        self.call_entry("teardown")
            .map_err(|message| LoaderError::Teardown {
                name: self.meta.name.clone(),
                message,
            })
    }

    fn has_teardown(&self) -> bool {
        self.has_teardown
    }
}
