//! In-process scene streamer with simulated latency and failure injection.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::{Error, Result};
use super::service::{LoadMode, SceneHandle, SceneStreamer};

/// Streaming operation recorded in the journal, in the order it happened
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    LoadStarted(String),
    LoadFinished(String),
    LoadFailed(String),
    UnloadStarted(String),
    UnloadFinished(String),
    UnloadFailed(String),
}

#[derive(Default)]
struct Registry {
    catalog: HashSet<String>,
    /// Loaded scenes in load order
    loaded: Vec<String>,
    active: Option<String>,
    fail_loads: HashSet<String>,
    fail_unloads: HashSet<String>,
    load_calls: HashMap<String, usize>,
    unload_calls: HashMap<String, usize>,
    journal: Vec<StreamEvent>,
    load_latency: Duration,
    unload_latency: Duration,
}

/// Scene streamer backed by in-memory bookkeeping.
///
/// Loads and unloads sleep for the configured latency before taking effect,
/// which keeps them observably in flight for concurrent callers.
pub struct InMemoryStreamer {
    registry: Mutex<Registry>,
}

impl InMemoryStreamer {
    /// Create a streamer whose catalog contains `scenes`
    pub fn new<I, S>(scenes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            registry: Mutex::new(Registry {
                catalog: scenes.into_iter().map(Into::into).collect(),
                ..Default::default()
            }),
        }
    }

    /// Set simulated latency for loads and unloads
    pub fn with_latency(self, load: Duration, unload: Duration) -> Self {
        {
            let mut reg = self.registry.lock();
            reg.load_latency = load;
            reg.unload_latency = unload;
        }
        self
    }

    /// Mark scenes as already loaded. The first becomes active if none is.
    pub fn with_loaded<I, S>(self, scenes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        {
            let mut reg = self.registry.lock();
            for name in scenes {
                let name = name.into();
                reg.catalog.insert(name.clone());
                if !reg.loaded.contains(&name) {
                    reg.loaded.push(name.clone());
                }
                if reg.active.is_none() {
                    reg.active = Some(name);
                }
            }
        }
        self
    }

    /// Add a scene to the catalog
    pub fn register(&self, name: impl Into<String>) {
        self.registry.lock().catalog.insert(name.into());
    }

    /// Make every subsequent load of `name` fail
    pub fn fail_loads_of(&self, name: impl Into<String>) {
        self.registry.lock().fail_loads.insert(name.into());
    }

    /// Make every subsequent unload of `name` fail
    pub fn fail_unloads_of(&self, name: impl Into<String>) {
        self.registry.lock().fail_unloads.insert(name.into());
    }

    /// Remove all injected failures
    pub fn clear_failures(&self) {
        let mut reg = self.registry.lock();
        reg.fail_loads.clear();
        reg.fail_unloads.clear();
    }

    /// Number of `load` calls issued for `name`
    pub fn load_calls(&self, name: &str) -> usize {
        self.registry.lock().load_calls.get(name).copied().unwrap_or(0)
    }

    /// Number of `unload` calls issued for `name`
    pub fn unload_calls(&self, name: &str) -> usize {
        self.registry.lock().unload_calls.get(name).copied().unwrap_or(0)
    }

    /// Snapshot of the event journal
    pub fn journal(&self) -> Vec<StreamEvent> {
        self.registry.lock().journal.clone()
    }

    /// Loaded scene names in load order
    pub fn loaded_scenes(&self) -> Vec<String> {
        self.registry.lock().loaded.clone()
    }
}

#[async_trait]
impl SceneStreamer for InMemoryStreamer {
    fn is_registered(&self, name: &str) -> bool {
        self.registry.lock().catalog.contains(name)
    }

    fn is_loaded(&self, name: &str) -> bool {
        self.registry.lock().loaded.iter().any(|s| s == name)
    }

    fn active_name(&self) -> Option<String> {
        self.registry.lock().active.clone()
    }

    fn scene_count(&self) -> usize {
        self.registry.lock().loaded.len()
    }

    fn scene_at(&self, index: usize) -> Option<SceneHandle> {
        self.registry.lock().loaded.get(index).map(|name| SceneHandle {
            name: name.clone(),
            index,
        })
    }

    async fn load(&self, name: &str, mode: LoadMode) -> Result<()> {
        let latency = {
            let mut reg = self.registry.lock();
            *reg.load_calls.entry(name.to_string()).or_insert(0) += 1;
            reg.journal.push(StreamEvent::LoadStarted(name.to_string()));
            if !reg.catalog.contains(name) {
                reg.journal.push(StreamEvent::LoadFailed(name.to_string()));
                return Err(Error::Streaming(format!("scene '{}' is not in the catalog", name)));
            }
            reg.load_latency
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut reg = self.registry.lock();
        if reg.fail_loads.contains(name) {
            reg.journal.push(StreamEvent::LoadFailed(name.to_string()));
            return Err(Error::Streaming(format!("scene '{}' failed to stream in", name)));
        }

        match mode {
            LoadMode::Single => {
                reg.loaded.clear();
                reg.loaded.push(name.to_string());
                reg.active = Some(name.to_string());
            }
            LoadMode::Additive => {
                if !reg.loaded.iter().any(|s| s == name) {
                    reg.loaded.push(name.to_string());
                }
                if reg.active.is_none() {
                    reg.active = Some(name.to_string());
                }
            }
        }
        reg.journal.push(StreamEvent::LoadFinished(name.to_string()));
        Ok(())
    }

    async fn unload(&self, name: &str) -> Result<()> {
        let latency = {
            let mut reg = self.registry.lock();
            *reg.unload_calls.entry(name.to_string()).or_insert(0) += 1;
            reg.journal.push(StreamEvent::UnloadStarted(name.to_string()));
            if !reg.loaded.iter().any(|s| s == name) {
                reg.journal.push(StreamEvent::UnloadFailed(name.to_string()));
                return Err(Error::Streaming(format!("scene '{}' is not loaded", name)));
            }
            reg.unload_latency
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut reg = self.registry.lock();
        if reg.fail_unloads.contains(name) {
            reg.journal.push(StreamEvent::UnloadFailed(name.to_string()));
            return Err(Error::Streaming(format!("scene '{}' failed to stream out", name)));
        }

        reg.loaded.retain(|s| s != name);
        if reg.active.as_deref() == Some(name) {
            reg.active = reg.loaded.first().cloned();
        }
        reg.journal.push(StreamEvent::UnloadFinished(name.to_string()));
        Ok(())
    }
}
