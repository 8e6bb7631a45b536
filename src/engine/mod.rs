mod availability;
mod bookings;
mod catalog;
mod conflict;
mod dashboard;
mod error;
mod pricing;
mod queries;
mod reset_codes;

pub use availability::{find_conflict, is_range_free};
pub use error::{EngineError, ErrorKind};
pub use pricing::{quote, rental_days};

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::info;
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub(crate) use conflict::now_ms;

pub type SharedVehicleState = Arc<RwLock<VehicleState>>;

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
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                commit_batch(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!("WAL flush failed for batch of {}: {e}", batch.len());
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
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
    // Flush even after an append error so half-written bytes don't leak
    // into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
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
            let mut batch = vec![(event, response)];
            commit_batch(wal, &mut batch);
        }
    }
}

/// The reservation engine: vehicle catalog, booking ledgers and reset codes.
///
/// Each vehicle's record and ledger sit behind one `RwLock`; booking creation
/// holds the write lock across the overlap check, the WAL append and the
/// in-memory apply, so overlapping requests for the same vehicle serialize.
///
/// Public mutations take `self: &Arc<Self>` and run on their own task:
/// dropping the caller's future (a timeout, a closed connection) stops the
/// wait, never the check → WAL → apply section.
pub struct Engine {
    vehicles: DashMap<Ulid, SharedVehicleState>,
    wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    /// booking id → vehicle id
    booking_to_vehicle: DashMap<Ulid, Ulid>,
    /// renter id → booking ids
    by_renter: DashMap<Ulid, Vec<Ulid>>,
    /// owner id → booking ids
    by_owner: DashMap<Ulid, Vec<Ulid>>,
    /// owner id → listed vehicle ids
    owner_vehicles: DashMap<Ulid, Vec<Ulid>>,
    reset_codes: DashMap<String, ResetCode>,
    /// Held shared by every mutation and exclusively by compaction.
    compaction_gate: RwLock<()>,
    last_created_at: AtomicI64,
}

/// Apply a vehicle-scoped event to its state (caller holds the lock).
fn apply_to_vehicle(vs: &mut VehicleState, event: &Event) {
    match event {
        Event::VehicleAvailabilitySet { available, .. } => {
            vs.vehicle.available = *available;
        }
        Event::VehicleRemoved { .. } => {
            vs.vehicle.available = false;
            vs.removed = true;
        }
        Event::BookingCreated { booking } => {
            vs.insert_booking(booking.clone());
        }
        Event::BookingStatusChanged { id, status, .. } => {
            if let Some(b) = vs.booking_mut(id) {
                b.status = *status;
            }
        }
        // Listing creates the state; reset codes aren't vehicle-scoped.
        Event::VehicleListed { .. }
        | Event::ResetCodeIssued { .. }
        | Event::ResetCodeRedeemed { .. } => {}
    }
}

/// The vehicle an event belongs to, if any.
fn event_vehicle_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::VehicleListed { vehicle } => Some(vehicle.id),
        Event::VehicleAvailabilitySet { id, .. } | Event::VehicleRemoved { id, .. } => Some(*id),
        Event::BookingCreated { booking } => Some(booking.vehicle_id),
        Event::BookingStatusChanged { vehicle_id, .. } => Some(*vehicle_id),
        Event::ResetCodeIssued { .. } | Event::ResetCodeRedeemed { .. } => None,
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            vehicles: DashMap::new(),
            wal_tx,
            notify,
            booking_to_vehicle: DashMap::new(),
            by_renter: DashMap::new(),
            by_owner: DashMap::new(),
            owner_vehicles: DashMap::new(),
            reset_codes: DashMap::new(),
            compaction_gate: RwLock::new(()),
            last_created_at: AtomicI64::new(0),
        };

        // Replay into plain structs first; nothing else can see them yet.
        let mut staged: HashMap<Ulid, VehicleState> = HashMap::new();
        for event in &events {
            match event {
                Event::VehicleListed { vehicle } => {
                    staged.insert(vehicle.id, VehicleState::new(vehicle.clone()));
                }
                other => {
                    if let Some(vid) = event_vehicle_id(other)
                        && let Some(vs) = staged.get_mut(&vid)
                    {
                        apply_to_vehicle(vs, other);
                    }
                }
            }
            engine.index_event(event);
        }
        for (id, vs) in staged {
            engine.vehicles.insert(id, Arc::new(RwLock::new(vs)));
        }

        if !events.is_empty() {
            info!(
                "replayed {} events: {} vehicles, {} bookings",
                events.len(),
                engine.vehicles.len(),
                engine.booking_to_vehicle.len()
            );
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

    /// Maintain the secondary indexes for an event. Idempotent per event.
    fn index_event(&self, event: &Event) {
        match event {
            Event::VehicleListed { vehicle } => {
                self.owner_vehicles
                    .entry(vehicle.owner_id)
                    .or_default()
                    .push(vehicle.id);
            }
            Event::VehicleRemoved { id, owner_id } => {
                if let Some(mut ids) = self.owner_vehicles.get_mut(owner_id) {
                    ids.retain(|v| v != id);
                }
            }
            Event::BookingCreated { booking } => {
                self.booking_to_vehicle.insert(booking.id, booking.vehicle_id);
                self.by_renter
                    .entry(booking.renter_id)
                    .or_default()
                    .push(booking.id);
                self.by_owner
                    .entry(booking.owner_id)
                    .or_default()
                    .push(booking.id);
                self.last_created_at
                    .fetch_max(booking.created_at, Ordering::SeqCst);
            }
            Event::ResetCodeIssued { reset } => {
                self.reset_codes.insert(reset.code.clone(), reset.clone());
            }
            Event::ResetCodeRedeemed { code, .. } => {
                self.reset_codes.remove(code);
            }
            Event::VehicleAvailabilitySet { .. } | Event::BookingStatusChanged { .. } => {}
        }
    }

    /// Run a mutation to completion on its own task. The caller may stop
    /// waiting; the mutation still commits or fails as a whole.
    async fn detached<T, F, Fut>(self: &Arc<Self>, op: F) -> Result<T, EngineError>
    where
        F: FnOnce(Arc<Engine>) -> Fut,
        Fut: Future<Output = Result<T, EngineError>> + Send + 'static,
        T: Send + 'static,
    {
        match tokio::spawn(op(Arc::clone(self))).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(EngineError::WalError(format!("mutation task cancelled: {e}"))),
        }
    }

    /// WAL-append, apply, index, notify. Nothing touches memory if the
    /// append fails.
    async fn persist_and_apply(&self, vs: &mut VehicleState, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_vehicle(vs, event);
        self.index_event(event);
        self.notify.send(event);
        Ok(())
    }

    /// Strictly increasing creation timestamps so newest-first ordering is
    /// total even within one millisecond.
    fn next_created_at(&self) -> Ms {
        let now = now_ms();
        let prev = self
            .last_created_at
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        now.max(prev + 1)
    }

    pub fn get_vehicle_state(&self, id: &Ulid) -> Option<SharedVehicleState> {
        self.vehicles.get(id).map(|e| e.value().clone())
    }

    pub fn vehicle_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_vehicle.get(booking_id).map(|e| *e.value())
    }

    // ── WAL maintenance ──────────────────────────────────────

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// Minimal event list that recreates the current state.
    async fn snapshot_events(&self) -> Vec<Event> {
        let mut ids: Vec<Ulid> = self.vehicles.iter().map(|e| *e.key()).collect();
        ids.sort();

        let mut events = Vec::new();
        for id in ids {
            let Some(rs) = self.get_vehicle_state(&id) else { continue };
            let guard = rs.read().await;
            if guard.removed && guard.bookings.is_empty() {
                continue;
            }
            events.push(Event::VehicleListed {
                vehicle: guard.vehicle.clone(),
            });
            let mut bookings: Vec<&Booking> = guard.bookings.iter().collect();
            bookings.sort_by_key(|b| b.created_at);
            for b in bookings {
                events.push(Event::BookingCreated { booking: b.clone() });
            }
            if guard.removed {
                events.push(Event::VehicleRemoved {
                    id,
                    owner_id: guard.vehicle.owner_id,
                });
            }
        }

        let now = now_ms();
        for entry in self.reset_codes.iter() {
            if entry.value().expires_at > now {
                events.push(Event::ResetCodeIssued {
                    reset: entry.value().clone(),
                });
            }
        }
        events
    }

    /// Rewrite the WAL as a snapshot of current state. Mutations are paused
    /// for the duration.
    pub async fn compact_wal(&self) -> Result<usize, EngineError> {
        let _gate = self.compaction_gate.write().await;
        let events = self.snapshot_events().await;
        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        Ok(count)
    }
}
