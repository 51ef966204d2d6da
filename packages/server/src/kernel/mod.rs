//! Kernel module - infrastructure traits, their implementations and the
//! dependency container.

pub mod deps;
pub mod generator;
pub mod kv_store;
pub mod notifier;
pub mod redis_store;
pub mod test_dependencies;
pub mod traits;

pub use deps::ServerDeps;
pub use generator::RandomGenerator;
pub use kv_store::{kv_store_from_uri, KvError, MemoryKvStore};
pub use notifier::{LogNotifier, Notification, NotificationAction, TwilioNotifier};
pub use redis_store::RedisKvStore;
pub use test_dependencies::TestDependencies;
pub use traits::*;
