//! Replication driver: journal reader → filter chain → replication actions.
//!
//! The replicator does not talk to replicas itself. Each pass turns the next
//! batch of journal events into [`ReplicationAction`]s for the transport.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use contentrepo_journal::{ChangeEvent, EventType, RevisionJournalReader};
use tokio::task;
use tracing::{debug, info};

use crate::error::ReplError;
use crate::filter::FilterChain;
use crate::node::NodeStateLookup;

/// What the transport must do for one journal event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationAction {
    /// Send the event to the replicas.
    Forward(ChangeEvent),
    /// Drop the event; its node is excluded.
    Skip(ChangeEvent),
    /// Delete a previously replicated copy of an excluded node.
    RemoveOnReplica {
        /// Excluded node.
        node_id: String,
        /// Its current path on the primary, if known.
        path: Option<String>,
    },
}

/// Counters accumulated over the replicator's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicationStats {
    /// Events taken from the journal.
    pub events_read: u64,
    /// Events forwarded.
    pub forwarded: u64,
    /// Events skipped by a filter.
    pub skipped: u64,
    /// Removal requests emitted.
    pub removals: u64,
    /// Completed passes.
    pub passes: u64,
}

/// Lifecycle of a replicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicatorState {
    /// Accepting passes.
    Running,
    /// Filters destroyed; passes return nothing.
    Stopped,
}

/// Applies a filter chain to the events of one journal reader.
pub struct Replicator {
    chain: FilterChain,
    nodes: Arc<dyn NodeStateLookup>,
    stats: ReplicationStats,
    state: ReplicatorState,
}

impl Replicator {
    /// Create a running replicator over an initialized chain.
    pub fn new(chain: FilterChain, nodes: Arc<dyn NodeStateLookup>) -> Self {
        Self {
            chain,
            nodes,
            stats: ReplicationStats::default(),
            state: ReplicatorState::Running,
        }
    }

    /// Read up to `max_events` events and decide what to do with each.
    ///
    /// Persist and node-removal events are always forwarded: the first carries
    /// no node, the second refers to a node that no longer exists. A removal
    /// request is emitted at most once per node per pass.
    pub fn run_pass(
        &mut self,
        reader: &mut RevisionJournalReader,
        max_events: usize,
    ) -> Vec<ReplicationAction> {
        if self.state == ReplicatorState::Stopped {
            return Vec::new();
        }

        let mut actions = Vec::new();
        let mut removed: HashSet<String> = HashSet::new();
        let mut read = 0usize;

        while read < max_events && reader.has_next() {
            let Ok(event) = reader.next_event() else {
                break;
            };
            read += 1;
            self.stats.events_read += 1;

            if matches!(event.event_type, EventType::Persist | EventType::NodeRemoved) {
                self.stats.forwarded += 1;
                actions.push(ReplicationAction::Forward(event));
                continue;
            }

            match self.chain.excluded_by(&event.node_id) {
                None => {
                    self.stats.forwarded += 1;
                    actions.push(ReplicationAction::Forward(event));
                }
                Some(filter) => {
                    debug!(
                        node_id = %event.node_id,
                        path = %event.path,
                        revision = event.revision,
                        filter,
                        "event skipped"
                    );
                    if self.chain.removes_existing(&event.node_id)
                        && removed.insert(event.node_id.clone())
                    {
                        self.stats.removals += 1;
                        actions.push(ReplicationAction::RemoveOnReplica {
                            node_id: event.node_id.clone(),
                            path: self.nodes.path(&event.node_id),
                        });
                    }
                    self.stats.skipped += 1;
                    actions.push(ReplicationAction::Skip(event));
                }
            }
        }

        self.stats.passes += 1;
        if read > 0 {
            debug!(
                events = read,
                last_revision = ?reader.last_revision(),
                "replication pass complete"
            );
        }
        actions
    }

    /// Run a pass every `poll_interval` until `shutdown` completes, handing
    /// every action to `on_action`.
    ///
    /// `shutdown` is polled first on every turn and lives across passes, so a
    /// shutdown that fires while a pass is running ends the loop right after
    /// that pass. Passes run on the blocking pool; the replicator and reader
    /// are handed back when the loop ends.
    pub async fn run_until<F, A>(
        mut self,
        mut reader: RevisionJournalReader,
        poll_interval: Duration,
        max_events: usize,
        shutdown: F,
        mut on_action: A,
    ) -> Result<(Self, RevisionJournalReader), ReplError>
    where
        F: Future<Output = ()>,
        A: FnMut(ReplicationAction),
    {
        tokio::pin!(shutdown);
        let mut interval = tokio::time::interval(poll_interval);
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = interval.tick() => {
                    let (replicator, resumed, actions) = task::spawn_blocking(move || {
                        let actions = self.run_pass(&mut reader, max_events);
                        (self, reader, actions)
                    })
                    .await
                    .map_err(|e| ReplError::Task { msg: e.to_string() })?;
                    self = replicator;
                    reader = resumed;
                    actions.into_iter().for_each(&mut on_action);
                }
            }
        }
        Ok((self, reader))
    }

    /// Counters so far.
    pub fn stats(&self) -> &ReplicationStats {
        &self.stats
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ReplicatorState {
        self.state
    }

    /// Number of filters in the chain.
    pub fn filter_count(&self) -> usize {
        self.chain.len()
    }

    /// Destroy all filters. Idempotent.
    pub fn shutdown(&mut self) {
        if self.state == ReplicatorState::Stopped {
            return;
        }
        self.chain.destroy_all();
        self.state = ReplicatorState::Stopped;
        info!(
            events_read = self.stats.events_read,
            forwarded = self.stats.forwarded,
            skipped = self.stats.skipped,
            removals = self.stats.removals,
            "replicator stopped"
        );
    }
}

impl Drop for Replicator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
