//! Fixed-cadence feed refresh.
//!
//! Every tick claims the least recently fetched feed, downloads and parses
//! its document, then normalizes and commits each item. Ticks never overlap:
//! the loop awaits each tick's work before waiting for the next one, and a
//! tick that comes due while work is still running fires once afterwards
//! instead of piling up.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::config::{parse_interval, ConfigError};
use crate::feed::{fetch_document, FetchError};
use crate::ingest::{ingest_items, IngestEvent, IngestSummary};
use crate::storage::{Database, DatabaseError, Feed};
use crate::util::CancelToken;

/// Errors that end one cycle. None of them stops the scheduler.
#[derive(Debug, Error)]
pub enum CycleError {
    /// Selecting or stamping the next feed failed
    #[error("Failed to claim next feed: {0}")]
    Claim(#[from] DatabaseError),
    /// The claimed feed could not be fetched or decoded
    #[error("Failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },
    /// The cancel token fired during the cycle; nothing was committed
    #[error("Cycle cancelled")]
    Cancelled,
}

/// What one cycle did
#[derive(Debug)]
pub enum CycleOutcome {
    /// No feeds registered, nothing to do
    Idle,
    /// One feed was fetched and its items committed
    Ingested { feed: Feed, summary: IngestSummary },
}

/// Shortest accepted tick period
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Runs the refresh loop over a database.
pub struct Scheduler {
    db: Database,
    client: reqwest::Client,
    interval: Duration,
    feeds_per_tick: usize,
    events: Option<mpsc::Sender<IngestEvent>>,
}

impl Scheduler {
    /// A scheduler that refreshes one feed every `interval`. Intervals
    /// shorter than [`MIN_INTERVAL`] are raised to it.
    pub fn new(db: Database, client: reqwest::Client, interval: Duration) -> Self {
        Self {
            db,
            client,
            interval: interval.max(MIN_INTERVAL),
            feeds_per_tick: 1,
            events: None,
        }
    }

    /// Refresh up to `n` distinct feeds per tick (at least one). Each is a
    /// full, separate cycle; a tick stops early once every feed has been
    /// claimed since the tick began.
    pub fn with_feeds_per_tick(mut self, n: usize) -> Self {
        self.feeds_per_tick = n.max(1);
        self
    }

    /// Announce every inserted post on `tx`.
    pub fn with_events(mut self, tx: mpsc::Sender<IngestEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Tick until `cancel` fires. The first tick runs immediately.
    pub async fn run(&self, cancel: CancelToken) {
        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            feeds_per_tick = self.feeds_per_tick,
            "Feed scheduler started"
        );

        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = timer.tick() => {}
            }
            self.tick(&cancel).await;
            if cancel.is_cancelled() {
                break;
            }
        }

        tracing::info!("Feed scheduler stopped");
    }

    /// One tick: up to `feeds_per_tick` cycles. Returns the number of feeds
    /// that were claimed.
    ///
    /// Only feeds not yet fetched during this tick are claimed, so a feed
    /// (failing or not) is fetched at most once per tick.
    pub async fn tick(&self, cancel: &CancelToken) -> usize {
        let started = Utc::now();
        let mut claimed = 0;

        for _ in 0..self.feeds_per_tick {
            match self.cycle(cancel, Some(started)).await {
                Ok(CycleOutcome::Idle) => {
                    tracing::debug!("No feeds due this tick");
                    break;
                }
                Ok(CycleOutcome::Ingested { feed, summary }) => {
                    claimed += 1;
                    tracing::info!(
                        feed = %feed.url,
                        inserted = summary.inserted,
                        skipped = summary.skipped,
                        failed = summary.failed,
                        "Feed refreshed"
                    );
                }
                Err(CycleError::Cancelled) => {
                    tracing::info!("Refresh cancelled");
                    break;
                }
                Err(e @ CycleError::Fetch { .. }) => {
                    claimed += 1;
                    tracing::warn!(error = %e, "Feed refresh failed");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Feed refresh failed");
                    break;
                }
            }
        }

        claimed
    }

    /// Exactly one claim → fetch → normalize → commit pass.
    ///
    /// The feed is stamped as fetched when claimed, so a failed fetch still
    /// moves it to the back of the rotation.
    ///
    /// # Errors
    ///
    /// - [`CycleError::Claim`] - the store could not select the next feed
    /// - [`CycleError::Fetch`] - transport, HTTP status or document error
    /// - [`CycleError::Cancelled`] - `cancel` fired before commit began
    pub async fn run_cycle(&self, cancel: &CancelToken) -> Result<CycleOutcome, CycleError> {
        self.cycle(cancel, None).await
    }

    async fn cycle(
        &self,
        cancel: &CancelToken,
        due_before: Option<DateTime<Utc>>,
    ) -> Result<CycleOutcome, CycleError> {
        if cancel.is_cancelled() {
            return Err(CycleError::Cancelled);
        }

        let now = Utc::now();
        let claimed = match due_before {
            Some(cutoff) => self.db.claim_next_due_feed(now, cutoff).await?,
            None => self.db.claim_next_feed(now).await?,
        };
        let Some(feed) = claimed else {
            return Ok(CycleOutcome::Idle);
        };
        tracing::debug!(feed = %feed.url, name = %feed.name, "Claimed feed");

        let doc = match fetch_document(&self.client, &feed.url, cancel).await {
            Ok(doc) => doc,
            Err(FetchError::Cancelled) => return Err(CycleError::Cancelled),
            Err(source) => {
                return Err(CycleError::Fetch {
                    url: feed.url,
                    source,
                })
            }
        };

        let summary = ingest_items(
            &self.db,
            &feed,
            &doc.items,
            now,
            self.events.as_ref(),
        )
        .await;

        Ok(CycleOutcome::Ingested { feed, summary })
    }
}

/// Parse `interval` and run the refresh loop until `cancel` fires.
///
/// A malformed interval is reported before anything runs.
pub async fn run_every(
    db: Database,
    client: reqwest::Client,
    interval: &str,
    feeds_per_tick: usize,
    events: Option<mpsc::Sender<IngestEvent>>,
    cancel: CancelToken,
) -> Result<(), ConfigError> {
    let interval = parse_interval(interval)?;

    let mut scheduler = Scheduler::new(db, client, interval).with_feeds_per_tick(feeds_per_tick);
    if let Some(tx) = events {
        scheduler = scheduler.with_events(tx);
    }

    scheduler.run(cancel).await;
    Ok(())
}
