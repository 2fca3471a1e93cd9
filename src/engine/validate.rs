use std::collections::BTreeMap;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

/// A service definition that passed every input check.
#[derive(Debug, Clone)]
pub(crate) struct CheckedSpec {
    pub name: String,
    pub capacity: u32,
    pub staff: StaffRef,
    pub description: String,
    pub schedule: Schedule,
}

fn required(field: &'static str, value: &str, max: usize) -> Result<String, EngineError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(EngineError::validation(format!("{field} is required")));
    }
    if value.len() > max {
        return Err(EngineError::LimitExceeded(field));
    }
    Ok(value.to_string())
}

fn optional(field: &'static str, value: &str, max: usize) -> Result<String, EngineError> {
    let value = value.trim();
    if value.len() > max {
        return Err(EngineError::LimitExceeded(field));
    }
    Ok(value.to_string())
}

/// Validate a candidate schedule.
///
/// Placeholder slots are dropped, then days left empty. What remains must be
/// non-empty, every slot must parse with `start < end`, and no day may list the
/// same slot twice. Slot order within a day is preserved.
pub fn validate_schedule(raw: &RawSchedule) -> Result<Schedule, EngineError> {
    let mut schedule: Schedule = BTreeMap::new();
    let mut seen_days = Vec::with_capacity(raw.len());

    for (key, slots) in raw {
        let day = Day::parse(key)
            .ok_or_else(|| EngineError::validation(format!("unknown day: {key:?}")))?;
        if seen_days.contains(&day) {
            return Err(EngineError::validation(format!("day listed twice: {day}")));
        }
        seen_days.push(day);

        let mut parsed: Vec<TimeSlot> = Vec::new();
        for raw_slot in slots.iter().filter(|s| !s.is_placeholder()) {
            let start = TimeOfDay::parse(&raw_slot.start).ok_or_else(|| {
                EngineError::validation(format!("{day}: bad start time {:?}", raw_slot.start))
            })?;
            let end = TimeOfDay::parse(&raw_slot.end).ok_or_else(|| {
                EngineError::validation(format!("{day}: bad end time {:?}", raw_slot.end))
            })?;
            if start >= end {
                return Err(EngineError::validation(format!(
                    "{day}: slot {start} - {end} must end after it starts"
                )));
            }
            let slot = TimeSlot::new(start, end);
            if parsed.contains(&slot) {
                return Err(EngineError::validation(format!("{day}: duplicate slot {slot}")));
            }
            parsed.push(slot);
        }

        if parsed.len() > MAX_SLOTS_PER_DAY {
            return Err(EngineError::LimitExceeded("too many slots in one day"));
        }
        if !parsed.is_empty() {
            schedule.insert(day, parsed);
        }
    }

    if schedule.is_empty() {
        return Err(EngineError::validation(
            "add at least one time slot to at least one day",
        ));
    }
    Ok(schedule)
}

pub(crate) fn validate_spec(spec: &ServiceSpec) -> Result<CheckedSpec, EngineError> {
    let name = required("service name", &spec.name, MAX_NAME_LEN)?;
    if spec.capacity == 0 {
        return Err(EngineError::validation("capacity must be at least 1"));
    }
    if spec.capacity > MAX_CAPACITY {
        return Err(EngineError::LimitExceeded("capacity too large"));
    }
    let staff = StaffRef {
        first_name: required("staff first name", &spec.staff.first_name, MAX_NAME_LEN)?,
        last_name: required("staff last name", &spec.staff.last_name, MAX_NAME_LEN)?,
        role: required("staff role", &spec.staff.role, MAX_NAME_LEN)?,
    };
    let description = required("description", &spec.description, MAX_DESCRIPTION_LEN)?;
    let schedule = validate_schedule(&spec.schedule)?;
    Ok(CheckedSpec {
        name,
        capacity: spec.capacity,
        staff,
        description,
        schedule,
    })
}

pub(crate) fn validate_staff(who: &StaffRef) -> Result<StaffRef, EngineError> {
    Ok(StaffRef {
        first_name: required("staff first name", &who.first_name, MAX_NAME_LEN)?,
        last_name: required("staff last name", &who.last_name, MAX_NAME_LEN)?,
        role: required("staff role", &who.role, MAX_NAME_LEN)?,
    })
}

pub(crate) fn validate_customer(customer: &Customer) -> Result<Customer, EngineError> {
    Ok(Customer {
        name: required("customer name", &customer.name, MAX_NAME_LEN)?,
        phone: optional("phone", &customer.phone, MAX_CONTACT_LEN)?,
        email: optional("email", &customer.email, MAX_CONTACT_LEN)?,
        notes: optional("notes", &customer.notes, MAX_NOTES_LEN)?,
    })
}

pub(crate) fn validate_provider(
    name: &str,
    profile: &ProviderProfile,
) -> Result<(String, ProviderProfile), EngineError> {
    let name = required("provider name", name, MAX_NAME_LEN)?;
    let profile = ProviderProfile {
        owner_name: optional("owner name", &profile.owner_name, MAX_NAME_LEN)?,
        business_type: optional("business type", &profile.business_type, MAX_NAME_LEN)?,
        phone: optional("phone", &profile.phone, MAX_CONTACT_LEN)?,
        email: optional("email", &profile.email, MAX_CONTACT_LEN)?,
        website: optional("website", &profile.website, MAX_CONTACT_LEN)?,
        hours: optional("hours", &profile.hours, MAX_NAME_LEN)?,
        off_days: optional("off days", &profile.off_days, MAX_NAME_LEN)?,
        address: optional("address", &profile.address, MAX_DESCRIPTION_LEN)?,
    };
    Ok((name, profile))
}
