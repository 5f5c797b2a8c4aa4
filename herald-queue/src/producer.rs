//! Producer: page recipients out of a caller-supplied source and enqueue
//! fan-out jobs.

use futures::future::BoxFuture;
use herald_core::{retry_with_backoff, ChannelKind, JobPayload, MessageMeta, DEFAULT_TRACKING_KEY};
use herald_ratelimit::TokenBucket;
use herald_redis::{RedisConfig, Store};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{info, info_span, warn, Instrument};

use crate::{JobOptions, JobQueue, QueueError, Result};

/// Retry budget for one page query (5 attempts total).
const DB_QUERY_RETRIES: u32 = 4;
const DB_QUERY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Concurrent page handlers.
const MAX_BATCH_HANDLERS: usize = 3;

/// Store connection handed to [`dispatch`] or the worker.
///
/// A `Handle` stays owned by the caller; `Params` creates a connection
/// owned by the dispatch call and released when it returns.
pub enum StoreConnection {
    /// Externally owned store handle.
    Handle(Store),
    /// Connection parameters for a dispatch-owned handle.
    Params(RedisConfig),
}

impl StoreConnection {
    pub(crate) async fn resolve(self) -> Result<(Store, bool)> {
        match self {
            Self::Handle(store) => Ok((store, false)),
            Self::Params(config) => Ok((Store::connect(config).await?, true)),
        }
    }
}

/// Paging callback: `(offset, limit)` to one page of records; an empty
/// page signals the end.
pub type PageFetcher<R> =
    Arc<dyn Fn(u64, u64) -> BoxFuture<'static, Result<Vec<R>>> + Send + Sync>;

/// Maps one record to its channel-specific recipient identifier.
pub type RecipientMapper<R> = Arc<dyn Fn(&R) -> String + Send + Sync>;

/// Builds one record's channel-typed meta.
pub type MetaBuilder<R> =
    Arc<dyn Fn(&R) -> std::result::Result<MessageMeta, String> + Send + Sync>;

/// The three caller callbacks a dispatch pages through.
pub struct RecipientSource<R> {
    pub(crate) fetch: PageFetcher<R>,
    pub(crate) recipient: RecipientMapper<R>,
    pub(crate) meta: MetaBuilder<R>,
}

impl<R> Clone for RecipientSource<R> {
    fn clone(&self) -> Self {
        Self {
            fetch: self.fetch.clone(),
            recipient: self.recipient.clone(),
            meta: self.meta.clone(),
        }
    }
}

impl<R> RecipientSource<R> {
    /// Bundle the paging, recipient and meta callbacks.
    pub fn new<F, Fut, M, B>(fetch: F, recipient: M, meta: B) -> Self
    where
        F: Fn(u64, u64) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<R>>> + Send + 'static,
        M: Fn(&R) -> String + Send + Sync + 'static,
        B: Fn(&R) -> std::result::Result<MessageMeta, String> + Send + Sync + 'static,
    {
        Self {
            fetch: Arc::new(move |offset, limit| Box::pin(fetch(offset, limit))),
            recipient: Arc::new(recipient),
            meta: Arc::new(meta),
        }
    }
}

/// Dispatch configuration.
pub struct DispatchConfig {
    /// Channel the jobs are built for.
    pub channel: ChannelKind,
    /// Queue to enqueue into.
    pub queue_name: String,
    /// Job name under the queue.
    pub job_name: String,
    /// Campaign id stamped on every job.
    pub campaign_id: Option<String>,
    /// Recipients per job.
    pub batch_size: u64,
    /// Page query pacing; unlimited when absent.
    pub max_queries_per_second: Option<f64>,
    /// Whether workers should record outcome counters.
    pub track_responses: bool,
    /// Hash key for outcome counters.
    pub tracking_key: String,
    /// Queue options stamped on every job.
    pub job_options: JobOptions,
    /// Enqueue retry budget.
    pub enqueue_retries: u32,
    /// Enqueue retry base delay.
    pub enqueue_base_delay: Duration,
}

impl DispatchConfig {
    /// Create a configuration for a channel, queue and job name.
    pub fn new(
        channel: ChannelKind,
        queue_name: impl Into<String>,
        job_name: impl Into<String>,
    ) -> Self {
        Self {
            channel,
            queue_name: queue_name.into(),
            job_name: job_name.into(),
            campaign_id: None,
            batch_size: 1000,
            max_queries_per_second: None,
            track_responses: false,
            tracking_key: DEFAULT_TRACKING_KEY.to_string(),
            job_options: JobOptions::default(),
            enqueue_retries: 3,
            enqueue_base_delay: Duration::from_millis(200),
        }
    }

    /// Set the campaign id.
    pub fn campaign(mut self, campaign_id: impl Into<String>) -> Self {
        self.campaign_id = Some(campaign_id.into());
        self
    }

    /// Set the recipients-per-job batch size.
    pub fn batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Pace page queries to at most `rate` per second.
    pub fn max_queries_per_second(mut self, rate: f64) -> Self {
        self.max_queries_per_second = Some(rate);
        self
    }

    /// Track outcome counters under a key.
    pub fn track_responses(mut self, tracking_key: impl Into<String>) -> Self {
        self.track_responses = true;
        self.tracking_key = tracking_key.into();
        self
    }

    /// Set the queue options stamped on every job.
    pub fn job_options(mut self, options: JobOptions) -> Self {
        self.job_options = options;
        self
    }

    /// Set the enqueue retry budget.
    pub fn enqueue_retries(mut self, retries: u32, base_delay: Duration) -> Self {
        self.enqueue_retries = retries;
        self.enqueue_base_delay = base_delay;
        self
    }
}

/// What one dispatch call accomplished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Jobs enqueued.
    pub jobs_enqueued: u64,
    /// Recipients covered by those jobs.
    pub recipients: u64,
}

/// Page every recipient out of `source` and enqueue fan-out jobs.
///
/// Pages are pulled sequentially (paced by `max_queries_per_second` when
/// set) while up to three page handlers map records and enqueue
/// concurrently. The first handler failure stops paging; outstanding
/// handlers are awaited before the error is returned. A dispatch-owned
/// store handle is released on exit.
pub async fn dispatch<R>(
    connection: StoreConnection,
    config: DispatchConfig,
    source: RecipientSource<R>,
) -> Result<DispatchSummary>
where
    R: Send + 'static,
{
    if config.queue_name.trim().is_empty() {
        return Err(QueueError::Config("queue_name is required".to_string()));
    }
    if config.job_name.trim().is_empty() {
        return Err(QueueError::Config("job_name is required".to_string()));
    }

    let span = info_span!(
        "dispatch",
        component = "producer",
        queue = %config.queue_name,
        job = %config.job_name,
        campaign_id = config.campaign_id.as_deref().unwrap_or(""),
        channel = %config.channel,
    );

    let (store, owned) = connection.resolve().await?;
    let result = run_dispatch(&store, config, source).instrument(span).await;

    if owned {
        // dispatch-owned handle; dropping the last clone closes it
        drop(store);
    }

    result
}

async fn run_dispatch<R>(
    store: &Store,
    config: DispatchConfig,
    source: RecipientSource<R>,
) -> Result<DispatchSummary>
where
    R: Send + 'static,
{
    let queue = JobQueue::new(store.clone(), &config.queue_name);
    let limiter = match config.max_queries_per_second {
        Some(rate) => {
            Some(TokenBucket::new(rate).map_err(|e| QueueError::Config(e.to_string()))?)
        }
        None => None,
    };

    let config = Arc::new(config);
    let mut offset: u64 = 0;
    let mut handlers: JoinSet<Result<u64>> = JoinSet::new();
    let mut summary = DispatchSummary::default();
    let mut first_error: Option<QueueError> = None;

    loop {
        if let Some(bucket) = &limiter {
            bucket.acquire().await;
        }

        let fetch = source.fetch.clone();
        let batch_size = config.batch_size;
        let page = match retry_with_backoff("db_query", DB_QUERY_RETRIES, DB_QUERY_BASE_DELAY, || {
            fetch(offset, batch_size)
        })
        .await
        {
            Ok(page) => page,
            Err(e) => {
                first_error = Some(e);
                break;
            }
        };

        if page.is_empty() {
            break;
        }
        // the offset advances by what the source returned, not by the
        // requested limit
        offset += page.len() as u64;

        while handlers.len() >= MAX_BATCH_HANDLERS {
            let Some(joined) = handlers.join_next().await else {
                break;
            };
            settle(joined, &mut summary, &mut first_error);
        }
        if first_error.is_some() {
            break;
        }

        let queue = queue.clone();
        let config = config.clone();
        let recipient = source.recipient.clone();
        let meta = source.meta.clone();
        handlers.spawn(async move { handle_page(queue, config, recipient, meta, page).await });
    }

    while let Some(joined) = handlers.join_next().await {
        settle(joined, &mut summary, &mut first_error);
    }

    match first_error {
        Some(e) => Err(e),
        None => {
            info!(
                component = "producer",
                jobs_enqueued = summary.jobs_enqueued,
                recipients = summary.recipients,
                "dispatch finished"
            );
            Ok(summary)
        }
    }
}

fn settle(
    joined: std::result::Result<Result<u64>, tokio::task::JoinError>,
    summary: &mut DispatchSummary,
    first_error: &mut Option<QueueError>,
) {
    match joined {
        Ok(Ok(recipients)) => {
            summary.jobs_enqueued += 1;
            summary.recipients += recipients;
        }
        Ok(Err(e)) => {
            if first_error.is_none() {
                *first_error = Some(e);
            }
        }
        Err(join_error) => {
            if first_error.is_none() {
                *first_error = Some(QueueError::ExecutionFailed(join_error.to_string()));
            }
        }
    }
}

/// Build one page's job payload.
///
/// A per-record meta failure is logged and that slot becomes the empty
/// meta for the channel rather than aborting the whole page.
fn build_page_payload<R>(
    config: &DispatchConfig,
    recipient: &RecipientMapper<R>,
    meta: &MetaBuilder<R>,
    page: &[R],
) -> JobPayload {
    let mut payload = JobPayload::new(config.channel);
    payload.track_responses = config.track_responses;
    payload.tracking_key = config.tracking_key.clone();
    payload.campaign_id = config.campaign_id.clone();

    for record in page {
        payload.user_ids.push((recipient)(record));
        let built = match (meta)(record) {
            Ok(built) if built.kind() == config.channel => built,
            Ok(built) => {
                warn!(
                    component = "producer",
                    expected = %config.channel,
                    got = %built.kind(),
                    "meta built for the wrong channel, using empty meta"
                );
                MessageMeta::empty(config.channel)
            }
            Err(e) => {
                warn!(
                    component = "producer",
                    error = %e,
                    "building meta failed for one record, using empty meta"
                );
                MessageMeta::empty(config.channel)
            }
        };
        payload.meta.push(built);
    }

    payload
}

async fn handle_page<R>(
    queue: JobQueue,
    config: Arc<DispatchConfig>,
    recipient: RecipientMapper<R>,
    meta: MetaBuilder<R>,
    page: Vec<R>,
) -> Result<u64> {
    let count = page.len() as u64;
    let payload = build_page_payload(&config, &recipient, &meta, &page);

    retry_with_backoff(
        "enqueue",
        config.enqueue_retries,
        config.enqueue_base_delay,
        || queue.add(&config.job_name, payload.clone(), &config.job_options),
    )
    .await?;

    Ok(count)
}
