//! Kernel module - server infrastructure and dependencies.

pub mod deps;
pub mod scheduled_tasks;
pub mod sse;
pub mod store;
pub mod stream_hub;

pub use deps::ServerDeps;
pub use store::{BaseDispatchStore, MemoryStore, PostgresStore, RetryPolicy, RetryingStore};
pub use stream_hub::StreamHub;
