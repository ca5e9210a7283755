pub mod comparator;
pub mod engine;
pub mod ignore;
pub mod inventory;
pub mod location;
pub mod manifest;
pub mod scanner;
pub mod transfer;

pub use comparator::{compare_inventories, SyncPlan};
pub use engine::{Analysis, Direction, SyncConfig, SyncEngine, SyncReport};
pub use ignore::{IgnoreFilter, IGNORE_FILE};
pub use inventory::{Inventory, MANIFEST_FILE};
pub use location::RemoteLocation;
pub use manifest::{ManifestLoad, ManifestStore};
pub use scanner::LocalScanner;
pub use transfer::{TransferExecutor, TransferStats, DEFAULT_CHECKPOINT_INTERVAL};
