pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod storage;

pub use crate::core::{Direction, Inventory, RemoteLocation, SyncConfig, SyncEngine, SyncReport};
pub use error::{Result, SyncError};
