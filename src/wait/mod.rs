//! Wait tokens and the duration-keyed token cache

pub mod cache;
pub mod token;

pub use cache::{CacheStats, WaitTokenCache};
pub use token::{WaitKind, WaitToken};
