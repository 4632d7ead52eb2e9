#![warn(missing_docs)]
//! ContentRepo replication daemon

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use contentrepo_journal::{CheckpointRegistry, FileJournal, RecordStore, RevisionJournalReader};
use contentrepo_repl::{
    FilterChain, MemoryNodeStore, NodeStateLookup, ReplConfig, ReplicationAction, Replicator,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("cr-repl.toml"));
    let config = ReplConfig::from_file(&config_path)?;
    tracing::info!(config = %config_path.display(), "ContentRepo replication daemon starting...");

    let journal: Arc<dyn RecordStore> = Arc::new(FileJournal::open(
        config.journal.journal_id.clone(),
        &config.journal.path,
    )?);
    let nodes: Arc<dyn NodeStateLookup> =
        Arc::new(MemoryNodeStore::from_json_file(&config.nodes_path)?);

    let chain = FilterChain::from_specs(&config.filters, Arc::clone(&nodes))?;
    let registry = CheckpointRegistry::new();
    let reader = RevisionJournalReader::new(journal, &registry, config.journal.reader_config());
    let replicator = Replicator::new(chain, nodes);
    tracing::info!(
        journal = %config.journal.path.display(),
        filters = replicator.filter_count(),
        "replication started"
    );

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("shutdown requested"),
            Err(e) => {
                tracing::error!(error = %e, "unable to listen for Ctrl-C; running until killed");
                std::future::pending::<()>().await;
            }
        }
    };

    let (mut replicator, reader) = replicator
        .run_until(
            reader,
            Duration::from_millis(config.poll_interval_ms),
            config.max_events_per_pass,
            shutdown,
            log_action,
        )
        .await?;

    replicator.shutdown();
    let stats = replicator.stats();
    tracing::info!(
        events_read = stats.events_read,
        forwarded = stats.forwarded,
        skipped = stats.skipped,
        last_revision = ?reader.last_revision(),
        "ContentRepo replication daemon stopped"
    );
    Ok(())
}

fn log_action(action: ReplicationAction) {
    match action {
        ReplicationAction::Forward(event) => tracing::info!(
            revision = event.revision,
            event_type = ?event.event_type,
            path = %event.path,
            "forward"
        ),
        ReplicationAction::Skip(event) => tracing::debug!(
            revision = event.revision,
            path = %event.path,
            "skip"
        ),
        ReplicationAction::RemoveOnReplica { node_id, path } => tracing::info!(
            node_id = %node_id,
            path = ?path,
            "remove on replica"
        ),
    }
}
