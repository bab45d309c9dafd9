mod conflict;
mod error;
mod mutations;
mod queries;
mod quota;
mod rules;
mod store;

pub use error::{EngineError, ErrorKind};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{error, info, warn};

use crate::catalog::RoomCatalog;
use crate::clock::Clock;
use crate::model::*;
use crate::wal::Wal;

use store::ReservationStore;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit.
/// Blocks for the first append, drains whatever else is already queued,
/// then flushes and fsyncs once for the whole batch.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                // Anything else must observe the batch already on disk.
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }
        commit_batch(&mut wal, &mut batch);
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();

    let result = wal.checkpoint().and_then(|checkpoint| {
        let written = batch
            .iter()
            .try_for_each(|(event, _)| wal.append_buffered(event))
            .and_then(|()| wal.flush_sync());
        if let Err(e) = &written {
            // Every caller in the batch gets the error, so none of it may survive.
            match wal.rollback(checkpoint) {
                Ok(()) => warn!("WAL batch of {} rolled back: {e}", batch.len()),
                Err(rollback_err) => error!("WAL rollback failed after {e}: {rollback_err}"),
            }
        }
        written
    });

    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());

    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The reservation admission engine.
///
/// One lock guards the whole store: `create` and `cancel` hold it for writing
/// from the first rule that reads the store until the event is applied, so the
/// quota and overlap checks can never be raced by another admission.
pub struct Engine {
    store: RwLock<ReservationStore>,
    catalog: Arc<dyn RoomCatalog>,
    clock: Arc<dyn Clock>,
    /// `None` for an ephemeral engine.
    wal_tx: Option<mpsc::Sender<WalCommand>>,
}

impl Engine {
    /// Open a durable engine, replaying the WAL at `wal_path` first.
    /// Must be called within a tokio runtime; it spawns the WAL writer.
    pub fn open(
        wal_path: PathBuf,
        catalog: Arc<dyn RoomCatalog>,
        clock: Arc<dyn Clock>,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let mut store = ReservationStore::new();
        for event in &events {
            store.apply_event(event);
        }
        info!(
            "replayed {} events, {} live reservations",
            events.len(),
            store.len()
        );

        Ok(Self {
            store: RwLock::new(store),
            catalog,
            clock,
            wal_tx: Some(wal_tx),
        })
    }

    /// An engine with no durability. State lives and dies with the value.
    pub fn ephemeral(catalog: Arc<dyn RoomCatalog>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: RwLock::new(ReservationStore::new()),
            catalog,
            clock,
            wal_tx: None,
        }
    }

    pub fn is_durable(&self) -> bool {
        self.wal_tx.is_some()
    }

    async fn send_wal(&self, cmd: WalCommand) -> Result<(), EngineError> {
        let Some(tx) = &self.wal_tx else {
            return Ok(());
        };
        tx.send(cmd)
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        if self.wal_tx.is_none() {
            return Ok(());
        }
        let (tx, rx) = oneshot::channel();
        self.send_wal(WalCommand::Append {
            event: event.clone(),
            response: tx,
        })
        .await?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// WAL-append then apply. The store is untouched if the append fails.
    pub(super) async fn persist_and_apply(
        &self,
        store: &mut ReservationStore,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        store.apply_event(event);
        Ok(())
    }

    /// Rewrite the WAL as one creation event per live reservation.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        if self.wal_tx.is_none() {
            return Ok(());
        }
        let (tx, rx) = oneshot::channel();
        {
            // Enqueue while still holding the read lock: every append that is not
            // in this snapshot is queued behind the compaction.
            let store = self.store.read().await;
            self.send_wal(WalCommand::Compact {
                events: store.snapshot_events(),
                response: tx,
            })
            .await?;
        }
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        if self.wal_tx.is_none() {
            return 0;
        }
        let (tx, rx) = oneshot::channel();
        if self
            .send_wal(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
