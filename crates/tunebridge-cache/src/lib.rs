mod lease;
mod snapshot;
mod store;

pub use lease::{EntityLease, EntityLocks};
pub use snapshot::{
    DEFAULT_TRACK_TTL, SnapshotCache, SnapshotState, playlist_key, snapshot_key, track_key,
};
pub use store::{CacheStore, MemoryCacheStore};
