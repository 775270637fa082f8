pub mod config;
pub mod time;

pub use config::StoreConfig;
pub use time::{now_epoch_ns, now_epoch_s};
