//! Scene streaming collaborator interface

use async_trait::async_trait;

use crate::core::Result;

/// How a scene load interacts with the scenes already loaded
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LoadMode {
    /// Replace every loaded scene; the new scene becomes active
    #[default]
    Single,
    /// Load alongside the current scenes
    Additive,
}

/// A loaded scene as reported by the streaming registry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SceneHandle {
    pub name: String,
    pub index: usize,
}

/// External subsystem that actually streams scenes in and out.
///
/// Registry queries are synchronous snapshots. `load` and `unload` resolve
/// once the streaming operation has completed or failed.
#[async_trait]
pub trait SceneStreamer: Send + Sync {
    /// Whether `name` is a loadable unit in the catalog
    fn is_registered(&self, name: &str) -> bool;

    /// Whether `name` is currently fully loaded
    fn is_loaded(&self, name: &str) -> bool;

    /// Name of the active scene, if any
    fn active_name(&self) -> Option<String>;

    /// Number of loaded scenes
    fn scene_count(&self) -> usize;

    /// Loaded scene at `index` in registry order
    fn scene_at(&self, index: usize) -> Option<SceneHandle>;

    async fn load(&self, name: &str, mode: LoadMode) -> Result<()>;

    async fn unload(&self, name: &str) -> Result<()>;
}
