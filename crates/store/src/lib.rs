pub mod error;
pub mod interval;
pub mod memory;
pub mod redis;

pub use self::redis::RedisStore;
pub use error::StoreError;
pub use interval::{build_store, IntervalStore, StoreOp};
pub use memory::MemoryStore;
