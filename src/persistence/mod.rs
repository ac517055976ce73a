pub mod snapshot;
pub mod store;

pub use snapshot::{
    SnapshotError, SnapshotMetadata, list_snapshots, load_latest_valid_snapshot, load_snapshot,
    prune_snapshots, save_snapshot,
};
pub use store::{ImportError, SeasonStore, export_season, parse_export};
