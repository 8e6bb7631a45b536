use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds (UTC). The only time type.
pub type Ms = i64;

pub const DAY_MS: Ms = 86_400_000;

/// Inclusive rental window `[pickup, return_at]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub pickup: Ms,
    pub return_at: Ms,
}

impl DateRange {
    pub fn new(pickup: Ms, return_at: Ms) -> Self {
        Self { pickup, return_at }
    }

    pub fn duration_ms(&self) -> Ms {
        self.return_at - self.pickup
    }

    /// Inclusive on both ends: a return on the same instant as another
    /// booking's pickup counts as overlapping.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.pickup <= other.return_at && self.return_at >= other.pickup
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Some(BookingStatus::Pending),
            "confirmed" => Some(BookingStatus::Confirmed),
            "cancelled" | "canceled" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }

    /// Transition table. Re-setting the current status is handled by the
    /// caller as a no-op and is not listed here.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Confirmed)
                | (BookingStatus::Pending, BookingStatus::Cancelled)
        )
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Owner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Owner => "owner",
        }
    }
}

/// Resolved caller identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester {
    pub user_id: Ulid,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: Ulid,
    pub owner_id: Ulid,
    pub location: String,
    pub price_per_day: Decimal,
    pub available: bool,
    pub brand: String,
    pub model: String,
    pub year: Option<u16>,
    pub category: Option<String>,
    pub transmission: Option<String>,
    pub fuel_type: Option<String>,
    pub seating_capacity: Option<u16>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub created_at: Ms,
}

/// Owner-supplied listing data; the engine fills in owner, flag and timestamps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VehicleDraft {
    pub id: Option<Ulid>,
    pub location: String,
    pub price_per_day: Decimal,
    pub brand: String,
    pub model: String,
    pub year: Option<u16>,
    pub category: Option<String>,
    pub transmission: Option<String>,
    pub fuel_type: Option<String>,
    pub seating_capacity: Option<u16>,
    pub description: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub vehicle_id: Ulid,
    /// Snapshot of the vehicle's owner at creation time.
    pub owner_id: Ulid,
    pub renter_id: Ulid,
    pub range: DateRange,
    pub price: Decimal,
    pub status: BookingStatus,
    pub created_at: Ms,
}

/// A vehicle plus its booking ledger, guarded as one unit.
#[derive(Debug, Clone)]
pub struct VehicleState {
    pub vehicle: Vehicle,
    /// Tombstone: removed vehicles keep their ledger so old bookings still resolve.
    pub removed: bool,
    /// Sorted by `range.pickup`.
    pub bookings: Vec<Booking>,
}

impl VehicleState {
    pub fn new(vehicle: Vehicle) -> Self {
        Self {
            vehicle,
            removed: false,
            bookings: Vec::new(),
        }
    }

    pub fn is_listed(&self) -> bool {
        !self.removed
    }

    /// Insert booking maintaining sort order by pickup.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.range.pickup, |b| b.range.pickup)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn booking(&self, id: &Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| &b.id == id)
    }

    pub fn booking_mut(&mut self, id: &Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| &b.id == id)
    }

    /// Bookings whose range overlaps `query`. Everything at or past the
    /// partition point picks up after `query.return_at` and can't overlap.
    pub fn overlapping<'a>(&'a self, query: &'a DateRange) -> impl Iterator<Item = &'a Booking> {
        let right_bound = self
            .bookings
            .partition_point(|b| b.range.pickup <= query.return_at);
        self.bookings
            .iter()
            .take(right_bound)
            .filter(move |b| b.range.return_at >= query.pickup)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetCode {
    pub code: String,
    pub user_id: Ulid,
    pub expires_at: Ms,
}

/// The event types. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    VehicleListed {
        vehicle: Vehicle,
    },
    VehicleAvailabilitySet {
        id: Ulid,
        owner_id: Ulid,
        available: bool,
    },
    VehicleRemoved {
        id: Ulid,
        owner_id: Ulid,
    },
    BookingCreated {
        booking: Booking,
    },
    BookingStatusChanged {
        id: Ulid,
        vehicle_id: Ulid,
        owner_id: Ulid,
        renter_id: Ulid,
        status: BookingStatus,
    },
    ResetCodeIssued {
        reset: ResetCode,
    },
    ResetCodeRedeemed {
        code: String,
        user_id: Ulid,
    },
}

impl Event {
    /// Short name used in logs and metric labels.
    pub fn label(&self) -> &'static str {
        match self {
            Event::VehicleListed { .. } => "vehicle_listed",
            Event::VehicleAvailabilitySet { .. } => "vehicle_availability_set",
            Event::VehicleRemoved { .. } => "vehicle_removed",
            Event::BookingCreated { .. } => "booking_created",
            Event::BookingStatusChanged { .. } => "booking_status_changed",
            Event::ResetCodeIssued { .. } => "reset_code_issued",
            Event::ResetCodeRedeemed { .. } => "reset_code_redeemed",
        }
    }

    /// The owner whose subscribers should hear about this event, if any.
    pub fn owner_id(&self) -> Option<Ulid> {
        match self {
            Event::VehicleListed { vehicle } => Some(vehicle.owner_id),
            Event::VehicleAvailabilitySet { owner_id, .. }
            | Event::VehicleRemoved { owner_id, .. }
            | Event::BookingStatusChanged { owner_id, .. } => Some(*owner_id),
            Event::BookingCreated { booking } => Some(booking.owner_id),
            Event::ResetCodeIssued { .. } | Event::ResetCodeRedeemed { .. } => None,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

/// A booking joined with its vehicle. `vehicle` is `None` once the vehicle
/// has been removed from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingView {
    pub booking: Booking,
    pub vehicle: Option<Vehicle>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VehicleAvailability {
    pub vehicle: Vehicle,
    pub is_available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardSummary {
    pub total_vehicles: usize,
    pub total_bookings: usize,
    pub pending_bookings: usize,
    /// Bookings in `confirmed` status.
    pub completed_bookings: usize,
    pub recent_bookings: Vec<BookingView>,
    /// Sum over confirmed bookings, all-time. The name is historical.
    pub monthly_revenue: Decimal,
}
