//! Host lifecycle: owns the coordinator and token cache for one application run

use std::sync::Arc;

use crate::config::HostConfig;
use crate::core::Result;
use crate::core::time::HostClock;
use crate::scene::{SceneLoadCoordinator, SceneStreamer};
use crate::wait::WaitTokenCache;

/// Lifecycle-scoped services for a running host.
///
/// Start it once inside a tokio runtime and call [`EngineHost::shutdown`]
/// before the runtime goes away.
pub struct EngineHost {
    clock: Arc<dyn HostClock>,
    coordinator: SceneLoadCoordinator,
    waits: WaitTokenCache,
}

impl EngineHost {
    /// Build the services and start the wait-token sweeper.
    pub fn start(
        streamer: Arc<dyn SceneStreamer>,
        clock: Arc<dyn HostClock>,
        config: &HostConfig,
    ) -> Result<Self> {
        config.wait_cache.validate()?;

        let waits = WaitTokenCache::new(Arc::clone(&clock), &config.wait_cache);
        waits.start_sweeper();

        log::info!(
            "Engine host started (token threshold {:?}, sweep every {:?})",
            config.wait_cache.unused_threshold(),
            config.wait_cache.cleanup_interval()
        );

        Ok(Self {
            clock,
            coordinator: SceneLoadCoordinator::new(streamer),
            waits,
        })
    }

    pub fn coordinator(&self) -> &SceneLoadCoordinator {
        &self.coordinator
    }

    pub fn waits(&self) -> &WaitTokenCache {
        &self.waits
    }

    pub fn clock(&self) -> &Arc<dyn HostClock> {
        &self.clock
    }

    /// Drain in-flight loads, then stop and join the sweeper.
    pub async fn shutdown(self) {
        self.coordinator.shutdown().await;
        self.waits.shutdown().await;
        log::info!("Engine host shut down");
    }
}
