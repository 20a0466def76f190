//! Scene loading: streaming collaborator interface and the load coordinator

pub mod coordinator;
pub mod memory;
pub mod service;

pub use coordinator::{
    Completion, InFlightLoad, LoadOutcome, LoadRequest, LoadState, SceneLoadCoordinator,
    UnloadOutcome,
};
pub use memory::{InMemoryStreamer, StreamEvent};
pub use service::{LoadMode, SceneHandle, SceneStreamer};
