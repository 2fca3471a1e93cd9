use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. Only booking timestamps use it.
pub type Ms = i64;

/// Day of the week, ordered Sunday first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Day {
    Sun,
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
}

impl Day {
    pub const ALL: [Day; 7] = [
        Day::Sun,
        Day::Mon,
        Day::Tue,
        Day::Wed,
        Day::Thu,
        Day::Fri,
        Day::Sat,
    ];

    pub fn abbr(self) -> &'static str {
        match self {
            Day::Sun => "sun",
            Day::Mon => "mon",
            Day::Tue => "tue",
            Day::Wed => "wed",
            Day::Thu => "thu",
            Day::Fri => "fri",
            Day::Sat => "sat",
        }
    }

    /// Parse a three-letter abbreviation, ignoring ASCII case and surrounding whitespace.
    pub fn parse(s: &str) -> Option<Day> {
        let s = s.trim();
        Day::ALL
            .into_iter()
            .find(|d| d.abbr().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abbr())
    }
}

/// Time of day as minutes since midnight.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub fn new(hour: u16, minute: u16) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self(hour * 60 + minute))
        } else {
            None
        }
    }

    /// Parse `H:MM` or `HH:MM` (24h clock).
    pub fn parse(s: &str) -> Option<Self> {
        let (h, m) = s.trim().split_once(':')?;
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return None;
        }
        if !h.bytes().chain(m.bytes()).all(|b| b.is_ascii_digit()) {
            return None;
        }
        Self::new(h.parse().ok()?, m.parse().ok()?)
    }

    pub fn minutes(self) -> u16 {
        self.0
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.minutes();
        write!(f, "{:02}:{:02}", m / 60, m % 60)
    }
}

impl fmt::Debug for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Half-open time-of-day range `[start, end)` within one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl TimeSlot {
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Self {
        debug_assert!(start < end, "TimeSlot start must be before end");
        Self { start, end }
    }

    /// Rendered form used on bookings: `"09:00 - 10:00"`.
    pub fn label(&self) -> String {
        format!("{} - {}", self.start, self.end)
    }

    /// Inverse of [`TimeSlot::label`]. Whitespace around the dash is optional.
    pub fn parse_label(s: &str) -> Option<Self> {
        let (start, end) = s.split_once('-')?;
        let start = TimeOfDay::parse(start)?;
        let end = TimeOfDay::parse(end)?;
        (start < end).then(|| Self::new(start, end))
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.start, self.end)
    }
}

/// A validated weekly schedule. Slots keep the order they were submitted in.
pub type Schedule = BTreeMap<Day, Vec<TimeSlot>>;

/// One slot as typed by a provider. Either field may be empty (placeholder).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSlot {
    pub start: String,
    pub end: String,
}

impl RawSlot {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.start.trim().is_empty() || self.end.trim().is_empty()
    }
}

/// Unvalidated schedule input: day key → slots, in submission order.
pub type RawSchedule = Vec<(String, Vec<RawSlot>)>;

/// Render a validated schedule back into raw input form.
pub fn schedule_to_raw(schedule: &Schedule) -> RawSchedule {
    schedule
        .iter()
        .map(|(day, slots)| {
            let raw = slots
                .iter()
                .map(|s| RawSlot::new(s.start.to_string(), s.end.to_string()))
                .collect();
            (day.abbr().to_string(), raw)
        })
        .collect()
}

// ── Rows ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub owner_name: String,
    pub business_type: String,
    pub phone: String,
    pub email: String,
    pub website: String,
    pub hours: String,
    pub off_days: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub id: Ulid,
    pub name: String,
    pub profile: ProviderProfile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Staff {
    pub id: Ulid,
    pub provider_id: Ulid,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
}

impl Staff {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn matches(&self, who: &StaffRef) -> bool {
        self.first_name == who.first_name && self.last_name == who.last_name && self.role == who.role
    }
}

/// Staff identity as submitted with a service definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffRef {
    pub first_name: String,
    pub last_name: String,
    pub role: String,
}

impl StaffRef {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            role: role.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: Ulid,
    pub provider_id: Ulid,
    pub name: String,
    pub description: String,
    /// Max bookings per slot.
    pub capacity: u32,
    pub staff_id: Ulid,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDay {
    pub id: Ulid,
    pub service_id: Ulid,
    pub day: Day,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRow {
    pub id: Ulid,
    pub day_id: Ulid,
    pub slot: TimeSlot,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub notes: String,
}

impl Customer {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// A confirmed seat. Service, day and slot are value snapshots taken at
/// admission time; later schedule edits never touch them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub provider_id: Ulid,
    pub service_id: Ulid,
    pub service_name: String,
    pub day: Day,
    pub slot: TimeSlot,
    pub customer: Customer,
    pub created_at: Ms,
}

/// Everything a provider submits to create or replace a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub name: String,
    pub capacity: u32,
    pub staff: StaffRef,
    pub description: String,
    pub schedule: RawSchedule,
}

// ── In-memory state ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DayState {
    pub row: ServiceDay,
    /// Slot rows in insertion order.
    pub slots: Vec<SlotRow>,
}

#[derive(Debug, Clone)]
pub struct ServiceState {
    pub service: Service,
    /// Sorted by day.
    pub days: Vec<DayState>,
    /// Confirmed seats per (day, slot). Outlives schedule replacement.
    pub seats: HashMap<(Day, TimeSlot), u32>,
}

impl ServiceState {
    pub fn new(service: Service) -> Self {
        Self {
            service,
            days: Vec::new(),
            seats: HashMap::new(),
        }
    }

    pub fn day(&self, day: Day) -> Option<&DayState> {
        self.days.iter().find(|d| d.row.day == day)
    }

    pub fn has_slot(&self, day: Day, slot: &TimeSlot) -> bool {
        self.day(day)
            .is_some_and(|d| d.slots.iter().any(|s| s.slot == *slot))
    }

    pub fn booked(&self, day: Day, slot: &TimeSlot) -> u32 {
        self.seats.get(&(day, *slot)).copied().unwrap_or(0)
    }

    pub fn schedule(&self) -> Schedule {
        self.days
            .iter()
            .map(|d| (d.row.day, d.slots.iter().map(|s| s.slot).collect()))
            .collect()
    }

    pub fn slot_count(&self) -> usize {
        self.days.iter().map(|d| d.slots.len()).sum()
    }
}

#[derive(Debug, Clone)]
pub struct ProviderState {
    pub provider: Provider,
    pub staff: Vec<Staff>,
    /// Services owned by this provider.
    pub services: BTreeSet<Ulid>,
}

impl ProviderState {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            staff: Vec::new(),
            services: BTreeSet::new(),
        }
    }

    pub fn staff(&self, id: &Ulid) -> Option<&Staff> {
        self.staff.iter().find(|s| s.id == *id)
    }

    pub fn find_staff(&self, who: &StaffRef) -> Option<&Staff> {
        self.staff.iter().find(|s| s.matches(who))
    }
}

// ── WAL records ──────────────────────────────────────────────────

/// One row-level change inside a unit of work. Mirrors the logical tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Change {
    StaffInserted {
        staff: Staff,
    },
    ServiceInserted {
        service: Service,
    },
    ServiceUpdated {
        id: Ulid,
        name: String,
        capacity: u32,
        description: String,
        staff_id: Ulid,
    },
    ServiceActiveSet {
        id: Ulid,
        active: bool,
    },
    SlotsDeleted {
        service_id: Ulid,
    },
    DaysDeleted {
        service_id: Ulid,
    },
    ServiceDeleted {
        id: Ulid,
    },
    DayInserted {
        day: ServiceDay,
    },
    SlotsInserted {
        day_id: Ulid,
        slots: Vec<SlotRow>,
    },
}

/// The WAL record format. Each record is one committed unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ProviderRegistered {
        provider: Provider,
    },
    StaffResolved {
        provider_id: Ulid,
        changes: Vec<Change>,
    },
    ScheduleCommitted {
        provider_id: Ulid,
        service_id: Ulid,
        changes: Vec<Change>,
    },
    BookingAdmitted {
        booking: Booking,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceView {
    pub id: Ulid,
    pub provider_id: Ulid,
    pub name: String,
    pub description: String,
    pub capacity: u32,
    pub active: bool,
    pub staff: Staff,
    pub schedule: Schedule,
}

impl ServiceView {
    pub fn staff_name(&self) -> String {
        self.staff.display_name()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotInfo {
    pub slot: TimeSlot,
    pub booked: u32,
    pub capacity: u32,
}

impl SlotInfo {
    pub fn available(&self) -> bool {
        self.booked < self.capacity
    }

    pub fn remaining(&self) -> u32 {
        self.capacity.saturating_sub(self.booked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> TimeOfDay {
        TimeOfDay::parse(s).unwrap()
    }

    #[test]
    fn day_parse_and_order() {
        assert_eq!(Day::parse("mon"), Some(Day::Mon));
        assert_eq!(Day::parse(" Tue "), Some(Day::Tue));
        assert_eq!(Day::parse("SAT"), Some(Day::Sat));
        assert_eq!(Day::parse("monday"), None);
        assert_eq!(Day::parse(""), None);
        assert!(Day::Sun < Day::Mon);
        assert!(Day::Fri < Day::Sat);
        assert_eq!(Day::Wed.to_string(), "wed");
    }

    #[test]
    fn time_of_day_parse() {
        assert_eq!(t("09:00").minutes(), 540);
        assert_eq!(t("9:05").minutes(), 545);
        assert_eq!(t("23:59").minutes(), 23 * 60 + 59);
        assert!(TimeOfDay::parse("24:00").is_none());
        assert!(TimeOfDay::parse("12:60").is_none());
        assert!(TimeOfDay::parse("12:5").is_none());
        assert!(TimeOfDay::parse("ab:cd").is_none());
        assert!(TimeOfDay::parse("").is_none());
        assert!(TimeOfDay::parse("-1:00").is_none());
    }

    #[test]
    fn time_of_day_display_pads() {
        assert_eq!(t("9:05").to_string(), "09:05");
        assert_eq!(format!("{:?}", t("14:30")), "14:30");
    }

    #[test]
    fn slot_label_roundtrip() {
        let slot = TimeSlot::new(t("09:00"), t("10:30"));
        assert_eq!(slot.label(), "09:00 - 10:30");
        assert_eq!(TimeSlot::parse_label("09:00 - 10:30"), Some(slot));
        assert_eq!(TimeSlot::parse_label("09:00-10:30"), Some(slot));
    }

    #[test]
    fn slot_label_rejects_inverted() {
        assert_eq!(TimeSlot::parse_label("10:00 - 09:00"), None);
        assert_eq!(TimeSlot::parse_label("10:00 - 10:00"), None);
        assert_eq!(TimeSlot::parse_label("10:00"), None);
    }

    #[test]
    fn raw_slot_placeholder() {
        assert!(RawSlot::new("", "").is_placeholder());
        assert!(RawSlot::new("09:00", " ").is_placeholder());
        assert!(!RawSlot::new("09:00", "10:00").is_placeholder());
    }

    #[test]
    fn service_state_seats_and_schedule() {
        let sid = Ulid::new();
        let mut st = ServiceState::new(Service {
            id: sid,
            provider_id: Ulid::new(),
            name: "Haircut".into(),
            description: String::new(),
            capacity: 2,
            staff_id: Ulid::new(),
            active: true,
        });
        let day_id = Ulid::new();
        let slot = TimeSlot::new(t("09:00"), t("10:00"));
        st.days.push(DayState {
            row: ServiceDay { id: day_id, service_id: sid, day: Day::Mon },
            slots: vec![SlotRow { id: Ulid::new(), day_id, slot }],
        });
        assert!(st.has_slot(Day::Mon, &slot));
        assert!(!st.has_slot(Day::Tue, &slot));
        assert_eq!(st.booked(Day::Mon, &slot), 0);
        st.seats.insert((Day::Mon, slot), 2);
        assert_eq!(st.booked(Day::Mon, &slot), 2);
        assert_eq!(st.schedule().get(&Day::Mon), Some(&vec![slot]));
        assert_eq!(st.slot_count(), 1);
    }

    #[test]
    fn schedule_to_raw_renders_abbrs() {
        let mut schedule = Schedule::new();
        schedule.insert(Day::Fri, vec![TimeSlot::new(t("08:00"), t("08:30"))]);
        let raw = schedule_to_raw(&schedule);
        assert_eq!(raw, vec![("fri".to_string(), vec![RawSlot::new("08:00", "08:30")])]);
    }

    #[test]
    fn slot_info_remaining() {
        let info = SlotInfo {
            slot: TimeSlot::new(t("09:00"), t("10:00")),
            booked: 3,
            capacity: 3,
        };
        assert!(!info.available());
        assert_eq!(info.remaining(), 0);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::ProviderRegistered {
            provider: Provider {
                id: Ulid::new(),
                name: "Sharp Cuts".into(),
                profile: ProviderProfile::default(),
            },
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
