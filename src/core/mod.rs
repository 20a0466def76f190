//! Core host types and utilities

pub mod error;
pub mod logging;
pub mod time;

pub use error::{Error, Result};
pub use time::{FrameClock, HostClock};
