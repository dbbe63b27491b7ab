//! Copy-group coordination: the engine and its per-group locking.

mod engine;
mod locks;

pub use engine::GroupCoordinator;
