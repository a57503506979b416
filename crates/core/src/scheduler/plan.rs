//! Admission of pulls into a sync run.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use tracing::{debug, info, warn};

use crate::locator::RemoteLocator;
use crate::metrics;
use crate::pulldb::{Pull, PullCatalog};

/// Orders pending pulls and decides which of them to sync.
///
/// Pulls in the same stream are assumed to depend on their predecessors: once
/// one pull of a stream cannot be located, every later pull of that stream is
/// skipped for the rest of the run. A new call to [`SyncScheduler::plan`]
/// starts with no stalled streams.
pub struct SyncScheduler {
    catalog: Arc<PullCatalog>,
    locator: Arc<RemoteLocator>,
}

impl SyncScheduler {
    pub fn new(catalog: Arc<PullCatalog>, locator: Arc<RemoteLocator>) -> Self {
        Self { catalog, locator }
    }

    /// Lazily yield at most `cap` pulls ready to sync, lowest weight first.
    ///
    /// Nothing is fetched or located until the stream is polled, and polling
    /// stops doing work once `cap` pulls have been yielded.
    pub fn plan(&self, items: Vec<Pull>, cap: usize) -> BoxStream<'static, Pull> {
        let state = PlanState::new(self.catalog.clone(), self.locator.clone(), items, cap);
        stream::unfold(state, |mut state| async move {
            let next = state.next_admitted().await?;
            Some((next, state))
        })
        .boxed()
    }
}

struct PlanState {
    catalog: Arc<PullCatalog>,
    locator: Arc<RemoteLocator>,
    queue: std::vec::IntoIter<Pull>,
    handled: HashSet<u64>,
    stalled: HashSet<String>,
    admitted: usize,
    cap: usize,
}

impl PlanState {
    fn new(
        catalog: Arc<PullCatalog>,
        locator: Arc<RemoteLocator>,
        mut items: Vec<Pull>,
        cap: usize,
    ) -> Self {
        items.sort_by(|a, b| a.weight.total_cmp(&b.weight).then(a.id.cmp(&b.id)));
        Self {
            catalog,
            locator,
            queue: items.into_iter(),
            handled: HashSet::new(),
            stalled: HashSet::new(),
            admitted: 0,
            cap,
        }
    }

    fn stall(&mut self, pull: &Pull) {
        if let Some(stream_id) = &pull.stream_id {
            if self.stalled.insert(stream_id.clone()) {
                metrics::STREAMS_STALLED.inc();
            }
        }
    }

    async fn next_admitted(&mut self) -> Option<Pull> {
        if self.admitted >= self.cap {
            return None;
        }

        while let Some(item) = self.queue.next() {
            if !self.handled.insert(item.id) {
                debug!(pull_id = item.id, "Skipping already handled pull");
                continue;
            }

            debug!(pull_id = item.id, "Checking pull");
            let pull = match self.catalog.refresh_pull(item.id).await {
                Ok(pull) => pull,
                Err(e) => {
                    warn!(pull_id = item.id, "Unable to refresh pull, skipping: {}", e);
                    continue;
                }
            };

            if pull.read {
                debug!(pull_id = pull.id, "Pull is no longer unread, skipping");
                continue;
            }

            if let Some(stream_id) = &pull.stream_id {
                if self.stalled.contains(stream_id) {
                    warn!(
                        pull_id = pull.id,
                        stream = %stream_id,
                        "Skipping pull {}, stream stalled",
                        pull.display_name()
                    );
                    continue;
                }
            }

            match self.locator.locate(pull.id).await {
                Ok(Some(_)) => {
                    self.admitted += 1;
                    metrics::ITEMS_ADMITTED.inc();
                    info!(pull_id = pull.id, weight = pull.weight, "Admitted {}", pull.display_name());
                    return Some(pull);
                }
                Ok(None) => {
                    warn!(
                        pull_id = pull.id,
                        stream = ?pull.stream_id,
                        "{} not in remote store, stalling stream",
                        pull.display_name()
                    );
                    self.stall(&pull);
                }
                Err(e) => {
                    warn!(
                        pull_id = pull.id,
                        stream = ?pull.stream_id,
                        "Unable to locate {}, stalling stream: {}",
                        pull.display_name(),
                        e
                    );
                    self.stall(&pull);
                }
            }
        }

        None
    }
}
