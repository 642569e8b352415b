use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use tunebridge_cache::SnapshotCache;
use tunebridge_core::{
    OmittedTrack, PlatformSearchTrack, TrackSearchData, TrackSearchResult, TuneError, TuneResult,
};

use crate::events::EventDispatcher;
use crate::platform::PlatformService;

pub const DEFAULT_WORKERS: usize = 10;
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl PoolConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }
}

#[derive(Debug)]
pub struct TrackJob {
    pub track: PlatformSearchTrack,
    /// 0-based position in the source playlist.
    pub index: usize,
    pub source_platform: String,
    pub target_platform: String,
    pub result: Option<TrackSearchResult>,
    pub error: Option<TuneError>,
}

impl TrackJob {
    pub fn new(
        track: PlatformSearchTrack,
        index: usize,
        source_platform: impl Into<String>,
        target_platform: impl Into<String>,
    ) -> Self {
        Self {
            track,
            index,
            source_platform: source_platform.into(),
            target_platform: target_platform.into(),
            result: None,
            error: None,
        }
    }

    fn omitted(&self) -> OmittedTrack {
        OmittedTrack {
            title: self.track.title.clone(),
            artists: self.track.artists.clone(),
            url: self.track.url.clone(),
            platform: self.source_platform.clone(),
            index: self.index + 1,
        }
    }
}

#[derive(Clone)]
pub struct MatchContext {
    pub target: Arc<dyn PlatformService>,
    pub cache: SnapshotCache,
    pub events: EventDispatcher,
    pub task_id: String,
    pub app: String,
}

#[derive(Debug, Default)]
pub struct MatchOutcome {
    pub matched: Vec<TrackSearchResult>,
    pub omitted: Vec<OmittedTrack>,
    pub cancelled: bool,
}

/// Cache failures are logged and treated as misses. A result with neither id
/// nor url counts as "no match".
pub(crate) async fn find_match(
    target: &dyn PlatformService,
    cache: &SnapshotCache,
    query: &TrackSearchData,
) -> TuneResult<Option<TrackSearchResult>> {
    let platform = target.key();
    let artist = query.artists.first().map(String::as_str).unwrap_or_default();

    match cache.cached_track(platform, artist, &query.title).await {
        Ok(Some(hit)) => {
            debug!(platform, title = %query.title, "track cache hit");
            return Ok(Some(hit));
        }
        Ok(None) => {}
        Err(err) => warn!(platform, error = %err, "track cache read failed"),
    }

    let found = target.search_track_with_title(query).await?;
    if found.id.is_empty() && found.url.is_empty() {
        return Ok(None);
    }
    if let Err(err) = cache.store_track(platform, artist, &query.title, &found).await {
        warn!(platform, error = %err, "track cache write failed");
    }
    Ok(Some(found))
}

#[derive(Debug, Clone, Default)]
pub struct MatchingPool {
    config: PoolConfig,
}

impl MatchingPool {
    pub fn new(config: PoolConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> PoolConfig {
        self.config
    }

    #[instrument(skip_all, fields(task_id = %ctx.task_id, jobs = jobs.len(), workers = self.config.workers))]
    pub async fn run(
        &self,
        ctx: MatchContext,
        jobs: Vec<TrackJob>,
        cancel: CancellationToken,
    ) -> MatchOutcome {
        let capacity = self.config.queue_capacity.max(1);
        let placeholders: BTreeMap<usize, OmittedTrack> = jobs
            .iter()
            .map(|job| (job.index, job.omitted()))
            .collect();

        let (job_tx, job_rx) = mpsc::channel::<TrackJob>(capacity);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, mut result_rx) = mpsc::channel::<TrackJob>(capacity);

        let producer = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                for job in jobs {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        sent = job_tx.send(job) => {
                            if sent.is_err() {
                                break;
                            }
                        }
                    }
                }
                // job_tx drops here, closing the queue
            })
        };

        let workers = self.config.workers.max(1);
        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            handles.push(tokio::spawn(worker_loop(
                worker_id,
                job_rx.clone(),
                result_tx.clone(),
                ctx.clone(),
                cancel.clone(),
            )));
        }
        // the results queue closes once every worker has dropped its sender
        drop(result_tx);

        let mut completed = Vec::with_capacity(placeholders.len());
        while let Some(job) = result_rx.recv().await {
            completed.push(job);
        }

        if let Err(err) = producer.await {
            warn!(error = %err, "job producer panicked");
        }
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "matching worker panicked");
            }
        }

        aggregate(completed, placeholders, cancel.is_cancelled())
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<Mutex<mpsc::Receiver<TrackJob>>>,
    results: mpsc::Sender<TrackJob>,
    ctx: MatchContext,
    cancel: CancellationToken,
) {
    loop {
        let next = {
            let mut queue = queue.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                job = queue.recv() => job,
            }
        };
        let Some(mut job) = next else {
            break;
        };

        let query = TrackSearchData::from(&job.track);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => job.error = Some(TuneError::Cancelled),
            found = find_match(ctx.target.as_ref(), &ctx.cache, &query) => match found {
                Ok(Some(track)) => job.result = Some(track),
                Ok(None) => {}
                Err(err) => {
                    debug!(worker_id, index = job.index, error = %err, "track match failed");
                    job.error = Some(err);
                }
            },
        }

        if let Some(track) = &job.result {
            ctx.events
                .track(&ctx.app, &job.target_platform, &ctx.task_id, track)
                .await;
        }
        if results.send(job).await.is_err() {
            break;
        }
    }
    debug!(worker_id, "matching worker exited");
}

fn aggregate(
    mut completed: Vec<TrackJob>,
    mut placeholders: BTreeMap<usize, OmittedTrack>,
    cancelled: bool,
) -> MatchOutcome {
    completed.sort_by_key(|job| job.index);

    let mut matched = Vec::with_capacity(completed.len());
    let mut omitted = Vec::new();
    for mut job in completed {
        placeholders.remove(&job.index);
        match job.result.take() {
            Some(track) if job.error.is_none() => matched.push(track),
            _ => omitted.push(job.omitted()),
        }
    }

    if !placeholders.is_empty() {
        warn!(unresolved = placeholders.len(), cancelled, "jobs never resolved");
        omitted.extend(placeholders.into_values());
        omitted.sort_by_key(|track| track.index);
    }

    MatchOutcome {
        matched,
        omitted,
        cancelled,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use tunebridge_cache::MemoryCacheStore;

    use super::*;
    use crate::events::LogNotifier;
    use crate::testing::{ScriptedPlatform, source_track};

    fn context(target: Arc<ScriptedPlatform>) -> MatchContext {
        MatchContext {
            target,
            cache: SnapshotCache::new(Arc::new(MemoryCacheStore::new())),
            events: EventDispatcher::new(Arc::new(LogNotifier)),
            task_id: "task-1".to_string(),
            app: "app-1".to_string(),
        }
    }

    fn jobs(titles: &[&str]) -> Vec<TrackJob> {
        titles
            .iter()
            .enumerate()
            .map(|(index, title)| {
                let track = source_track(&format!("s{}", index + 1), title, "Artist");
                TrackJob::new(PlatformSearchTrack::from(&track), index, "spotify", "deezer")
            })
            .collect()
    }

    #[tokio::test]
    async fn output_order_follows_source_not_completion() {
        // later tracks finish first
        let target = Arc::new(
            ScriptedPlatform::new("deezer")
                .with_delay("T1", Duration::from_millis(40))
                .with_delay("T2", Duration::from_millis(20)),
        );
        let pool = MatchingPool::new(PoolConfig::default().with_workers(3));

        let outcome = pool
            .run(context(target), jobs(&["T1", "T2", "T3"]), CancellationToken::new())
            .await;

        let titles: Vec<&str> = outcome.matched.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["T1", "T2", "T3"]);
        assert!(outcome.omitted.is_empty());
        assert!(!outcome.cancelled);
    }

    #[tokio::test]
    async fn failed_match_becomes_omitted_with_one_based_index() {
        let target = Arc::new(ScriptedPlatform::new("deezer").failing("T2"));
        let pool = MatchingPool::new(PoolConfig::default());

        let outcome = pool
            .run(context(target), jobs(&["T1", "T2", "T3"]), CancellationToken::new())
            .await;

        let titles: Vec<&str> = outcome.matched.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["T1", "T3"]);
        assert_eq!(outcome.omitted.len(), 1);
        let omitted = &outcome.omitted[0];
        assert_eq!(omitted.title, "T2");
        assert_eq!(omitted.index, 2);
        assert_eq!(omitted.platform, "spotify");
        assert_eq!(omitted.url, "https://spotify.test/s2");
    }

    #[tokio::test]
    async fn every_job_is_accounted_for_with_few_workers_and_small_queue() {
        let titles: Vec<String> = (1..=57).map(|i| format!("Song {i}")).collect();
        let refs: Vec<&str> = titles.iter().map(String::as_str).collect();
        let target = Arc::new(
            ScriptedPlatform::new("deezer")
                .failing("Song 7")
                .failing("Song 33"),
        );
        let pool = MatchingPool::new(
            PoolConfig::default()
                .with_workers(4)
                .with_queue_capacity(2),
        );

        let outcome = pool
            .run(context(target.clone()), jobs(&refs), CancellationToken::new())
            .await;

        assert_eq!(outcome.matched.len() + outcome.omitted.len(), 57);
        assert_eq!(outcome.matched.len(), 55);
        let omitted: Vec<usize> = outcome.omitted.iter().map(|t| t.index).collect();
        assert_eq!(omitted, vec![7, 33]);
        assert_eq!(target.title_calls.load(Ordering::SeqCst), 57);
    }

    #[tokio::test]
    async fn cached_tracks_skip_upstream_but_still_match() {
        let target = Arc::new(ScriptedPlatform::new("deezer"));
        let ctx = context(target.clone());
        let pool = MatchingPool::new(PoolConfig::default());

        pool.run(ctx.clone(), jobs(&["T1", "T2"]), CancellationToken::new())
            .await;
        assert_eq!(target.title_calls.load(Ordering::SeqCst), 2);

        let outcome = pool
            .run(ctx, jobs(&["T1", "T2"]), CancellationToken::new())
            .await;
        assert_eq!(outcome.matched.len(), 2);
        assert_eq!(target.title_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancellation_reports_unresolved_jobs_as_omitted() {
        let target = Arc::new(ScriptedPlatform::new("deezer").hanging("T2").hanging("T3"));
        let pool = MatchingPool::new(PoolConfig::default().with_workers(2));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let outcome = pool
            .run(context(target), jobs(&["T1", "T2", "T3", "T4", "T5"]), cancel)
            .await;

        assert!(outcome.cancelled);
        assert_eq!(outcome.matched.len() + outcome.omitted.len(), 5);
        assert!(outcome.matched.iter().any(|t| t.title == "T1"));
        let omitted: Vec<usize> = outcome.omitted.iter().map(|t| t.index).collect();
        assert!(omitted.contains(&2));
        assert!(omitted.contains(&3));
        assert!(omitted.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[tokio::test]
    async fn empty_job_list_finishes() {
        let target = Arc::new(ScriptedPlatform::new("deezer"));
        let outcome = MatchingPool::default()
            .run(context(target), Vec::new(), CancellationToken::new())
            .await;
        assert_eq!(outcome.matched.len() + outcome.omitted.len(), 0);
    }
}
