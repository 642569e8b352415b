use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tunebridge_core::{EntityKind, LinkInfo, TuneError, TuneResult};
use uuid::Uuid;

pub const MAX_SUBSCRIBERS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SubscriberId {
    type Err = TuneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|err| TuneError::InvalidInput(format!("invalid subscriber id {s}: {err}")))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberSet(Vec<SubscriberId>);

impl SubscriberSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_from_ids(ids: impl IntoIterator<Item = SubscriberId>) -> TuneResult<Self> {
        let mut set = Vec::new();
        for id in ids {
            if !set.contains(&id) {
                set.push(id);
            }
        }
        if set.len() > MAX_SUBSCRIBERS {
            return Err(TuneError::TooManySubscribers {
                count: set.len(),
                max: MAX_SUBSCRIBERS,
            });
        }
        Ok(Self(set))
    }

    pub fn contains(&self, id: &SubscriberId) -> bool {
        self.0.contains(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SubscriberId> {
        self.0.iter()
    }

    pub fn missing<'a>(&self, ids: &'a [SubscriberId]) -> Vec<&'a SubscriberId> {
        let mut missing: Vec<&SubscriberId> = Vec::new();
        for id in ids {
            if !self.contains(id) && !missing.contains(&id) {
                missing.push(id);
            }
        }
        missing
    }

    /// Adds every id from `ids` or none of them. Returns how many were new.
    pub fn extend_checked(&mut self, ids: &[SubscriberId]) -> TuneResult<usize> {
        let missing = self.missing(ids);
        let count = self.0.len() + missing.len();
        if count > MAX_SUBSCRIBERS {
            return Err(TuneError::TooManySubscribers {
                count,
                max: MAX_SUBSCRIBERS,
            });
        }
        let added = missing.len();
        self.0.extend(missing.into_iter().copied());
        Ok(added)
    }
}

impl<'a> IntoIterator for &'a SubscriberSet {
    type Item = &'a SubscriberId;
    type IntoIter = std::slice::Iter<'a, SubscriberId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowStatus {
    #[default]
    Active,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowRecord {
    pub uuid: Uuid,
    pub developer: String,
    pub app: String,
    pub entity_id: String,
    pub entity_url: String,
    pub platform: String,
    pub target_platform: String,
    pub subscribers: SubscriberSet,
    #[serde(default)]
    pub status: FollowStatus,
    pub updated_at: DateTime<Utc>,
}

impl FollowRecord {
    pub fn from_request(request: &FollowRequest, now: DateTime<Utc>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            developer: request.developer.clone(),
            app: request.app.clone(),
            entity_id: request.info.entity_id.clone(),
            entity_url: request.url.clone(),
            platform: request.info.platform.clone(),
            target_platform: request.info.target_platform.clone(),
            subscribers: request.subscribers.clone(),
            status: FollowStatus::Active,
            updated_at: now,
        }
    }

    pub fn is_eligible(&self, now: DateTime<Utc>, failure_backoff: chrono::Duration) -> bool {
        if self.entity_id.is_empty() || self.entity_url.is_empty() {
            return false;
        }
        match self.status {
            FollowStatus::Active => true,
            FollowStatus::Failed => now - self.updated_at >= failure_backoff,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FollowRequest {
    pub developer: String,
    pub app: String,
    pub url: String,
    pub info: LinkInfo,
    pub subscribers: SubscriberSet,
}

impl FollowRequest {
    pub fn new(
        developer: impl Into<String>,
        app: impl Into<String>,
        url: impl Into<String>,
        info: LinkInfo,
        subscribers: impl IntoIterator<Item = SubscriberId>,
    ) -> TuneResult<Self> {
        if info.entity != EntityKind::Playlist {
            return Err(TuneError::InvalidInput(format!(
                "only playlists can be followed, got a {}",
                info.entity
            )));
        }
        if info.target_platform.trim().is_empty() || info.wants_all_platforms() {
            return Err(TuneError::Configuration(
                "a follow needs a single target platform".to_string(),
            ));
        }
        let subscribers = SubscriberSet::try_from_ids(subscribers)?;
        if subscribers.is_empty() {
            return Err(TuneError::InvalidInput(
                "a follow needs at least one subscriber".to_string(),
            ));
        }
        Ok(Self {
            developer: developer.into(),
            app: app.into(),
            url: url.into(),
            info,
            subscribers,
        })
    }

    pub fn subscriber_ids(&self) -> Vec<SubscriberId> {
        self.subscribers.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playlist_info() -> LinkInfo {
        LinkInfo {
            platform: "spotify".to_string(),
            target_platform: "deezer".to_string(),
            entity: EntityKind::Playlist,
            entity_id: "p1".to_string(),
            target_link: String::new(),
            task_id: String::new(),
            app: "app".to_string(),
        }
    }

    fn ids(n: usize) -> Vec<SubscriberId> {
        (0..n).map(|_| SubscriberId::new()).collect()
    }

    #[test]
    fn set_drops_duplicates() {
        let a = SubscriberId::new();
        let set = SubscriberSet::try_from_ids([a, a, a]).unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn twenty_one_subscribers_are_rejected() {
        let result = FollowRequest::new("dev", "app", "url", playlist_info(), ids(21));
        assert!(matches!(
            result,
            Err(TuneError::TooManySubscribers { count: 21, max: 20 })
        ));
        assert!(FollowRequest::new("dev", "app", "url", playlist_info(), ids(20)).is_ok());
    }

    #[test]
    fn tracks_cannot_be_followed() {
        let mut info = playlist_info();
        info.entity = EntityKind::Track;
        let result = FollowRequest::new("dev", "app", "url", info, ids(1));
        assert!(matches!(result, Err(TuneError::InvalidInput(_))));
    }

    #[test]
    fn follow_needs_a_single_target() {
        let info = playlist_info().with_target("all");
        let result = FollowRequest::new("dev", "app", "url", info, ids(1));
        assert!(matches!(result, Err(TuneError::Configuration(_))));
    }

    #[test]
    fn extend_is_all_or_nothing() {
        let mut set = SubscriberSet::try_from_ids(ids(19)).unwrap();
        let result = set.extend_checked(&ids(2));
        assert!(matches!(result, Err(TuneError::TooManySubscribers { count: 21, .. })));
        assert_eq!(set.len(), 19);

        let existing: Vec<SubscriberId> = set.iter().copied().take(3).collect();
        assert_eq!(set.extend_checked(&existing).unwrap(), 0);
        assert_eq!(set.extend_checked(&ids(1)).unwrap(), 1);
        assert_eq!(set.len(), 20);
    }

    #[test]
    fn failed_records_wait_out_the_backoff() {
        let now = Utc::now();
        let request = FollowRequest::new("dev", "app", "url", playlist_info(), ids(1)).unwrap();
        let mut record = FollowRecord::from_request(&request, now);
        let backoff = chrono::Duration::seconds(3600);
        assert!(record.is_eligible(now, backoff));

        record.status = FollowStatus::Failed;
        assert!(!record.is_eligible(now + chrono::Duration::seconds(60), backoff));
        assert!(record.is_eligible(now + chrono::Duration::seconds(3600), backoff));

        record.entity_url.clear();
        record.status = FollowStatus::Active;
        assert!(!record.is_eligible(now, backoff));
    }

    #[test]
    fn subscriber_ids_parse() {
        let id: SubscriberId = "67e55044-10b1-426f-9247-bb680e5fe0c8".parse().unwrap();
        assert_eq!(id.to_string(), "67e55044-10b1-426f-9247-bb680e5fe0c8");
        assert!("nope".parse::<SubscriberId>().is_err());
    }
}
