use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};
use tunebridge_core::{TuneError, TuneResult};

use crate::record::{FollowRecord, FollowRequest};
use crate::store::FollowStore;

#[derive(Clone)]
pub struct FollowService {
    store: Arc<dyn FollowStore>,
}

impl FollowService {
    pub fn new(store: Arc<dyn FollowStore>) -> Self {
        Self { store }
    }

    #[instrument(skip_all, fields(entity_id = %request.info.entity_id, app = %request.app))]
    pub async fn follow_playlist(&self, request: FollowRequest) -> TuneResult<FollowRecord> {
        let entity_id = request.info.entity_id.clone();

        if self.store.find_by_entity(&entity_id).await?.is_none() {
            let record = FollowRecord::from_request(&request, Utc::now());
            match self.store.create(record.clone()).await {
                Ok(()) => {
                    info!(subscribers = record.subscribers.len(), "follow created");
                    return Ok(record);
                }
                // lost a race with a concurrent create; append instead
                Err(TuneError::AlreadyFollowing { .. }) => {}
                Err(err) => return Err(err),
            }
        }

        let ids = request.subscriber_ids();
        let added = self.store.add_subscribers(&entity_id, &ids).await?;
        if added == 0 && ids.len() == 1 {
            return Err(TuneError::AlreadyFollowing { entity_id });
        }
        info!(added, "follow subscribers updated");

        self.store
            .find_by_entity(&entity_id)
            .await?
            .ok_or_else(|| TuneError::NotFound(format!("follow for {entity_id}")))
    }
}
