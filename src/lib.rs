//! Scenehost - engine lifecycle utilities
//!
//! A coalescing scene-load coordinator and a cache of reusable wait tokens,
//! bundled by [`host::EngineHost`].

pub mod core;
pub mod config;
pub mod scene;
pub mod wait;
pub mod host;
