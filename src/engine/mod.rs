mod admission;
mod error;
mod mutations;
mod queries;
mod staff;
mod txn;
mod validate;

pub use error::EngineError;
pub use validate::validate_schedule;

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;

use txn::{apply_change, Staged};

pub type SharedProviderState = Arc<RwLock<ProviderState>>;
pub type SharedServiceState = Arc<RwLock<ServiceState>>;

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

/// Background task that owns the WAL and batches appends for group commit.
/// Appends already queued behind the first one share a single fsync; a
/// non-append command closes the batch early.
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
        let mut trailing = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    trailing = Some(other);
                    break;
                }
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            tracing::error!("WAL flush failed for {} records: {e}", batch.len());
        }
        respond_batch(batch, &result);

        if let Some(other) = trailing {
            handle_non_append(&mut wal, other);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after a failed append so stray bytes don't ride along with
    // the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn respond_batch(batch: Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
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
        WalCommand::Append { event, response } => {
            let result = wal.append_buffered(&event).and_then(|()| wal.flush_sync());
            let _ = response.send(result);
        }
    }
}

// ── Replay ───────────────────────────────────────────────

/// State rebuilt from the WAL before anything is shared.
#[derive(Default)]
struct Recovered {
    providers: HashMap<Ulid, ProviderState>,
    services: HashMap<Ulid, ServiceState>,
    bookings: HashMap<Ulid, Vec<Booking>>,
}

impl Recovered {
    fn apply(&mut self, event: &Event) -> Result<(), EngineError> {
        match event {
            Event::ProviderRegistered { provider } => {
                self.providers
                    .insert(provider.id, ProviderState::new(provider.clone()));
            }
            Event::StaffResolved { provider_id, changes } => {
                let provider = self
                    .providers
                    .get_mut(provider_id)
                    .ok_or(EngineError::NotFound(*provider_id))?;
                let mut staged = Staged {
                    provider: provider.clone(),
                    service: None,
                };
                for change in changes {
                    apply_change(&mut staged, change)?;
                }
                *provider = staged.provider;
            }
            Event::ScheduleCommitted {
                provider_id,
                service_id,
                changes,
            } => {
                let provider = self
                    .providers
                    .get_mut(provider_id)
                    .ok_or(EngineError::NotFound(*provider_id))?;
                let mut staged = Staged {
                    provider: provider.clone(),
                    service: self.services.get(service_id).cloned(),
                };
                for change in changes {
                    apply_change(&mut staged, change)?;
                }
                *provider = staged.provider;
                match staged.service {
                    Some(service) => {
                        self.services.insert(*service_id, service);
                    }
                    None => {
                        self.services.remove(service_id);
                    }
                }
            }
            Event::BookingAdmitted { booking } => {
                if let Some(service) = self.services.get_mut(&booking.service_id) {
                    *service.seats.entry((booking.day, booking.slot)).or_insert(0) += 1;
                }
                self.bookings
                    .entry(booking.provider_id)
                    .or_default()
                    .push(booking.clone());
            }
        }
        Ok(())
    }
}

pub struct Engine {
    pub(super) providers: DashMap<Ulid, SharedProviderState>,
    /// Provider display name → provider id.
    pub(super) provider_names: DashMap<String, Ulid>,
    pub(super) services: DashMap<Ulid, SharedServiceState>,
    /// Booking ledger per provider, in admission order. Kept when the
    /// booked service is deleted.
    pub(super) bookings: DashMap<Ulid, Vec<Booking>>,
    /// Every commit holds this shared; compaction takes it exclusively so its
    /// snapshot never misses an in-flight unit of work.
    pub(super) commit_gate: RwLock<()>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
}

impl Engine {
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let mut recovered = Recovered::default();
        for (i, event) in events.iter().enumerate() {
            // A record that no longer applies cleanly is skipped rather than
            // aborting startup.
            if let Err(e) = recovered.apply(event) {
                tracing::warn!("replay: skipping WAL record {i}: {e}");
            }
        }
        tracing::info!(
            "replayed {} WAL records: {} providers, {} services",
            events.len(),
            recovered.providers.len(),
            recovered.services.len()
        );

        let engine = Self {
            providers: DashMap::new(),
            provider_names: DashMap::new(),
            services: DashMap::new(),
            bookings: DashMap::new(),
            commit_gate: RwLock::new(()),
            wal_tx,
        };
        for (id, state) in recovered.providers {
            engine.provider_names.insert(state.provider.name.clone(), id);
            engine.providers.insert(id, Arc::new(RwLock::new(state)));
        }
        for (id, state) in recovered.services {
            engine.services.insert(id, Arc::new(RwLock::new(state)));
        }
        for (provider_id, ledger) in recovered.bookings {
            engine.bookings.insert(provider_id, ledger);
        }
        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_provider_state(&self, id: &Ulid) -> Option<SharedProviderState> {
        self.providers.get(id).map(|e| e.value().clone())
    }

    pub fn get_service_state(&self, id: &Ulid) -> Option<SharedServiceState> {
        self.services.get(id).map(|e| e.value().clone())
    }

    pub(super) fn provider_or_not_found(&self, id: &Ulid) -> Result<SharedProviderState, EngineError> {
        self.get_provider_state(id).ok_or(EngineError::NotFound(*id))
    }

    /// Swap a committed unit of work into live state. The caller still holds
    /// the provider guard, and the service guard when the service existed.
    pub(super) fn install(
        &self,
        provider: &mut ProviderState,
        service: Option<&mut ServiceState>,
        service_id: Ulid,
        staged: Staged,
    ) {
        *provider = staged.provider;
        match (staged.service, service) {
            (Some(next), Some(live)) => *live = next,
            (Some(next), None) => {
                self.services.insert(service_id, Arc::new(RwLock::new(next)));
            }
            (None, _) => {
                self.services.remove(&service_id);
            }
        }
    }
}
