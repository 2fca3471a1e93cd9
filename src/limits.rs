//! Hard limits enforced before anything reaches the WAL.

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_DESCRIPTION_LEN: usize = 4096;
pub const MAX_NOTES_LEN: usize = 2048;
pub const MAX_CONTACT_LEN: usize = 256;

/// Seats per slot.
pub const MAX_CAPACITY: u32 = 10_000;

pub const MAX_SLOTS_PER_DAY: usize = 96;
pub const MAX_SERVICES_PER_PROVIDER: usize = 1_000;
pub const MAX_STAFF_PER_PROVIDER: usize = 1_000;
pub const MAX_PROVIDERS: usize = 100_000;

/// Upper bound on the JSON schedule text accepted over the wire.
pub const MAX_SCHEDULE_JSON_LEN: usize = 64 * 1024;
