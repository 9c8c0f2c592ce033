//! Seams to the outside world: storage and the chat platform

pub mod platform;
pub mod store;

pub use platform::{CategoryInfo, Platform};
pub use store::{AtomicScope, JamStore, LockKey};

#[cfg(test)]
pub use platform::MockPlatform;
