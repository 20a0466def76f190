//! Scene load coordinator
//!
//! Serializes and deduplicates load/unload requests against a [`SceneStreamer`].
//!
//! Key guarantees:
//! - At most one in-flight load per scene name; duplicate requests attach to it
//! - Every queued completion callback fires exactly once, after the load it
//!   attached to has finished, whether that load succeeded or failed
//! - The in-flight marker is cleared before callbacks run, so a callback never
//!   observes a stale `Loading` state for the scene it waited on
//! - Unloads are refused while a load for the same name is in flight

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinSet;

use crate::core::{Error, Result};
use super::service::{LoadMode, SceneStreamer};

/// Zero-argument completion callback
pub type Completion = Box<dyn FnOnce() + Send + 'static>;

/// Load state of a scene, derived from the in-flight book and the streamer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loading,
    Loaded,
}

/// A request to load a scene
pub struct LoadRequest {
    name: String,
    mode: LoadMode,
    on_completed: Option<Completion>,
    try_load: bool,
    reload: bool,
}

impl LoadRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: LoadMode::default(),
            on_completed: None,
            try_load: false,
            reload: false,
        }
    }

    pub fn mode(mut self, mode: LoadMode) -> Self {
        self.mode = mode;
        self
    }

    /// Callback fired once the scene is loaded (or the load has failed)
    pub fn on_completed<F>(mut self, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_completed = Some(Box::new(f));
        self
    }

    /// Decline to wait if a load for this scene is already in flight
    pub fn try_load(mut self, try_load: bool) -> Self {
        self.try_load = try_load;
        self
    }

    /// Unload the scene first if it is loaded, then load it again
    pub fn reload(mut self, reload: bool) -> Self {
        self.reload = reload;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for LoadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadRequest")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("has_callback", &self.on_completed.is_some())
            .field("try_load", &self.try_load)
            .field("reload", &self.reload)
            .finish()
    }
}

/// What happened to a load request
#[derive(Debug)]
pub enum LoadOutcome {
    /// Scene was already loaded; the callback ran immediately
    AlreadyLoaded,
    /// Attached to a load already in flight
    Coalesced,
    /// A load was in flight and the request asked not to wait
    Declined,
    /// Scene is not in the streaming catalog
    NotFound,
    /// This request drove the load and it succeeded
    Loaded,
    /// This request drove the load and the streamer failed
    Failed(Error),
    /// Coordinator has been shut down
    Closed,
}

impl LoadOutcome {
    /// Whether the scene is (or will be) loaded as a result of the request
    pub fn is_success(&self) -> bool {
        matches!(self, Self::AlreadyLoaded | Self::Coalesced | Self::Loaded)
    }
}

/// What happened to an unload request
#[derive(Debug)]
pub enum UnloadOutcome {
    NotLoaded,
    /// A load for the same scene is in flight
    Refused,
    Unloaded,
    Failed(Error),
    Closed,
}

/// Book entry for a load that has started but not finished
#[derive(Clone, Debug)]
pub struct InFlightLoad {
    pub ticket: u64,
    pub mode: LoadMode,
    pub reload: bool,
    pub started: Instant,
}

#[derive(Default)]
struct LoadBook {
    in_flight: HashMap<String, InFlightLoad>,
    pending: HashMap<String, Vec<Completion>>,
    closed: bool,
}

struct Inner {
    streamer: Arc<dyn SceneStreamer>,
    book: Mutex<LoadBook>,
    next_ticket: AtomicU64,
    idle: Notify,
}

/// Coordinates scene loads for every caller in the host.
///
/// Cloning is cheap; clones share the same book.
#[derive(Clone)]
pub struct SceneLoadCoordinator {
    inner: Arc<Inner>,
}

impl SceneLoadCoordinator {
    pub fn new(streamer: Arc<dyn SceneStreamer>) -> Self {
        Self {
            inner: Arc::new(Inner {
                streamer,
                book: Mutex::new(LoadBook::default()),
                next_ticket: AtomicU64::new(1),
                idle: Notify::new(),
            }),
        }
    }

    /// The streamer this coordinator drives
    pub fn streamer(&self) -> &Arc<dyn SceneStreamer> {
        &self.inner.streamer
    }

    /// Load a scene with default options
    pub async fn load(&self, name: impl Into<String>, mode: LoadMode) -> LoadOutcome {
        self.request_load(LoadRequest::new(name).mode(mode)).await
    }

    /// Request a scene load.
    ///
    /// Resolves once the load this request started or attached to is settled
    /// from the caller's point of view: immediately for duplicates and
    /// rejections, after completion for the request that drives the load.
    /// Once started, a load runs to completion even if this future is dropped.
    ///
    /// A plain (non-reload) request for a scene that is still loaded returns
    /// [`LoadOutcome::AlreadyLoaded`] even while a reload of that scene is in
    /// its unload phase and [`Self::load_state`] reports `Loading`.
    pub async fn request_load(&self, request: LoadRequest) -> LoadOutcome {
        let LoadRequest { name, mode, on_completed, try_load, reload } = request;

        if self.is_closed() {
            log::warn!("Load of scene '{}' requested after shutdown; ignoring.", name);
            return LoadOutcome::Closed;
        }

        if !reload && self.inner.streamer.is_loaded(&name) {
            log::info!("Scene '{}' is already loaded.", name);
            if let Some(callback) = on_completed {
                callback();
            }
            return LoadOutcome::AlreadyLoaded;
        }

        {
            let mut book = self.inner.book.lock();
            if book.in_flight.contains_key(&name) {
                return Self::attach(&mut book, &name, on_completed, try_load);
            }
        }

        if !self.inner.streamer.is_registered(&name) {
            log::error!("{}", Error::SceneNotFound(name));
            return LoadOutcome::NotFound;
        }

        let ticket = {
            let mut book = self.inner.book.lock();
            if book.closed {
                log::warn!("Load of scene '{}' requested after shutdown; ignoring.", name);
                return LoadOutcome::Closed;
            }
            // Double-check: another caller may have reserved the scene since
            // the first look.
            if book.in_flight.contains_key(&name) {
                return Self::attach(&mut book, &name, on_completed, try_load);
            }

            let ticket = self.inner.next_ticket.fetch_add(1, Ordering::Relaxed);
            book.pending.insert(name.clone(), on_completed.into_iter().collect());
            book.in_flight.insert(
                name.clone(),
                InFlightLoad { ticket, mode, reload, started: Instant::now() },
            );
            ticket
        };

        let inner = Arc::clone(&self.inner);
        let task_name = name.clone();
        let handle = tokio::spawn(async move {
            inner.drive_load(&task_name, mode, reload, ticket).await
        });

        match handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("Load task for scene '{}' panicked: {}", name, e);
                LoadOutcome::Failed(Error::Streaming(format!("load task for '{}' panicked", name)))
            }
        }
    }

    fn attach(
        book: &mut LoadBook,
        name: &str,
        on_completed: Option<Completion>,
        try_load: bool,
    ) -> LoadOutcome {
        log::info!("Scene '{}' is already loading.", name);
        if try_load {
            return LoadOutcome::Declined;
        }
        if let Some(callback) = on_completed {
            let queue = book.pending.entry(name.to_string()).or_default();
            queue.push(callback);
            log::debug!("Queued completion #{} for scene '{}'", queue.len(), name);
        }
        LoadOutcome::Coalesced
    }

    /// Reload the streamer's active scene
    pub async fn reload_active(&self, on_completed: Option<Completion>) -> LoadOutcome {
        let Some(active) = self.inner.streamer.active_name() else {
            log::warn!("No active scene to reload.");
            return LoadOutcome::NotFound;
        };

        let mut request = LoadRequest::new(active).mode(LoadMode::Single).reload(true);
        request.on_completed = on_completed;
        self.request_load(request).await
    }

    /// Unload a scene by name.
    ///
    /// No-op if the scene is not loaded; refused if a load for it is in flight.
    pub async fn request_unload(&self, name: &str) -> UnloadOutcome {
        if self.is_closed() {
            log::warn!("Unload of scene '{}' requested after shutdown; ignoring.", name);
            return UnloadOutcome::Closed;
        }

        if !self.inner.streamer.is_loaded(name) {
            log::info!("Scene '{}' is not loaded.", name);
            return UnloadOutcome::NotLoaded;
        }

        if self.is_loading(name) {
            let err = Error::InvalidUnload {
                scene: name.to_string(),
                reason: "scene is currently loading",
            };
            log::warn!("{}", err);
            return UnloadOutcome::Refused;
        }

        match self.inner.streamer.unload(name).await {
            Ok(()) => {
                log::info!("Scene '{}' unloaded successfully.", name);
                UnloadOutcome::Unloaded
            }
            Err(e) => {
                log::error!("Failed to unload scene '{}': {}", name, e);
                UnloadOutcome::Failed(e)
            }
        }
    }

    /// Unload every loaded scene not named in `exclude`, concurrently.
    ///
    /// Each unload is independent; one failure does not stop the others.
    /// Outcomes are returned in registry order.
    pub async fn unload_all_except<I, S>(&self, exclude: I) -> Vec<(String, UnloadOutcome)>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let exclude: HashSet<String> = exclude.into_iter().map(Into::into).collect();

        let targets: Vec<String> = (0..self.inner.streamer.scene_count())
            .filter_map(|i| self.inner.streamer.scene_at(i))
            .map(|handle| handle.name)
            .filter(|name| !exclude.contains(name))
            .collect();

        let mut tasks = JoinSet::new();
        for (index, name) in targets.into_iter().enumerate() {
            let coordinator = self.clone();
            tasks.spawn(async move {
                let outcome = coordinator.request_unload(&name).await;
                (index, name, outcome)
            });
        }

        let mut results = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => log::error!("Unload task panicked: {}", e),
            }
        }

        results.sort_by_key(|(index, _, _)| *index);
        results.into_iter().map(|(_, name, outcome)| (name, outcome)).collect()
    }

    /// Unload everything except `exclude` and the target, then load the target.
    pub async fn swap_to<I, S>(&self, request: LoadRequest, exclude: I) -> LoadOutcome
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut keep: Vec<String> = exclude.into_iter().map(Into::into).collect();
        keep.push(request.name.clone());

        self.unload_all_except(keep).await;
        self.request_load(request).await
    }

    /// Stop accepting requests and wait for in-flight loads to finish.
    pub async fn shutdown(&self) {
        let in_flight = {
            let mut book = self.inner.book.lock();
            book.closed = true;
            book.in_flight.len()
        };
        log::info!("Scene coordinator shutting down ({} load(s) in flight)", in_flight);
        self.wait_idle().await;
    }

    /// Wait until no load is in flight and every callback has been flushed.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.inner.book.lock().in_flight.is_empty() {
                return;
            }
            notified.await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.book.lock().closed
    }

    /// Current load state of `name`
    pub fn load_state(&self, name: &str) -> LoadState {
        if self.is_loading(name) {
            LoadState::Loading
        } else if self.inner.streamer.is_loaded(name) {
            LoadState::Loaded
        } else {
            LoadState::Unloaded
        }
    }

    pub fn is_loading(&self, name: &str) -> bool {
        self.inner.book.lock().in_flight.contains_key(name)
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner.book.lock().in_flight.len()
    }

    /// In-flight entry for `name`, if a load is running
    pub fn in_flight(&self, name: &str) -> Option<InFlightLoad> {
        self.inner.book.lock().in_flight.get(name).cloned()
    }

    /// Number of callbacks waiting on the in-flight load of `name`
    pub fn pending_callbacks(&self, name: &str) -> usize {
        self.inner.book.lock().pending.get(name).map_or(0, Vec::len)
    }

    /// Names of scenes with a load in flight, sorted
    pub fn loading_scenes(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.book.lock().in_flight.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Inner {
    async fn drive_load(&self, name: &str, mode: LoadMode, reload: bool, ticket: u64) -> LoadOutcome {
        let guard = FlushGuard { inner: self, name, ticket, armed: true };

        let outcome = match self.run_load(name, mode, reload).await {
            Ok(()) => {
                log::info!("Scene '{}' loaded successfully.", name);
                LoadOutcome::Loaded
            }
            Err(e) => {
                log::error!("Failed to load scene '{}': {}", name, e);
                LoadOutcome::Failed(e)
            }
        };

        guard.finish();
        outcome
    }

    async fn run_load(&self, name: &str, mode: LoadMode, reload: bool) -> Result<()> {
        if reload && self.streamer.is_loaded(name) {
            self.streamer.unload(name).await?;
            log::info!("Scene '{}' unloaded for reload.", name);
        }
        self.streamer.load(name, mode).await
    }

    /// Clear the in-flight entry, then flush the callbacks queued on it.
    fn complete(&self, name: &str, ticket: u64) {
        let callbacks = {
            let mut book = self.book.lock();
            if !book.in_flight.get(name).is_some_and(|entry| entry.ticket == ticket) {
                log::warn!("Completion for scene '{}' does not match its in-flight entry", name);
                return;
            }
            book.in_flight.remove(name);
            book.pending.remove(name).unwrap_or_default()
        };

        log::debug!("Flushing {} completion(s) for scene '{}'", callbacks.len(), name);
        for callback in callbacks {
            if panic::catch_unwind(AssertUnwindSafe(callback)).is_err() {
                log::error!("Completion callback for scene '{}' panicked", name);
            }
        }
        self.idle.notify_waiters();
    }
}

/// Completes the load even if the driving task unwinds.
struct FlushGuard<'a> {
    inner: &'a Inner,
    name: &'a str,
    ticket: u64,
    armed: bool,
}

impl FlushGuard<'_> {
    fn finish(mut self) {
        self.armed = false;
        self.inner.complete(self.name, self.ticket);
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.armed = false;
            self.inner.complete(self.name, self.ticket);
        }
    }
}
