pub mod queue;
pub mod record;
pub mod service;
pub mod store;
pub mod sync;

pub use queue::{DedupStrategy, MemoryTaskQueue, QueuedTask, SyncTask, TaskQueue};
pub use record::{FollowRecord, FollowRequest, FollowStatus, MAX_SUBSCRIBERS, SubscriberId, SubscriberSet};
pub use service::FollowService;
pub use store::{
    FollowStore, MemoryFollowStore, MemoryNotificationStore, Notification, NotificationStore,
};
pub use sync::{
    DrainReport, PlaylistUpdatedEvent, SyncPassReport, SyncScheduler, SyncSettings, TaskOutcome,
};
