use std::collections::BTreeSet;

use ulid::Ulid;

use crate::model::*;
use crate::observability::{BOOKINGS_ADMITTED_TOTAL, BOOKINGS_REJECTED_TOTAL};

use super::validate::{now_ms, validate_customer};
use super::{Engine, EngineError};

fn rejected(reason: &'static str) {
    metrics::counter!(BOOKINGS_REJECTED_TOTAL, "reason" => reason).increment(1);
}

fn slot_infos(state: &ServiceState, day: Day) -> Vec<SlotInfo> {
    let Some(day_state) = state.day(day) else {
        return Vec::new();
    };
    day_state
        .slots
        .iter()
        .map(|row| SlotInfo {
            slot: row.slot,
            booked: state.booked(day, &row.slot),
            capacity: state.service.capacity,
        })
        .collect()
}

impl Engine {
    /// Advisory check. The authoritative one happens again in `admit_booking`.
    pub async fn is_available(&self, service_id: Ulid, day: Day, slot: TimeSlot) -> bool {
        let Some(service) = self.get_service_state(&service_id) else {
            return false;
        };
        let guard = service.read().await;
        guard.service.active
            && guard.has_slot(day, &slot)
            && guard.booked(day, &slot) < guard.service.capacity
    }

    /// Admit one booking into `(service, day, slot)`.
    ///
    /// The service's write lock is held from the capacity check through the
    /// WAL write and the seat increment, so concurrent admissions on the same
    /// service are serialized and `booked` never passes `capacity`.
    pub async fn admit_booking(
        &self,
        service_id: Ulid,
        day: Day,
        slot: TimeSlot,
        customer: Customer,
    ) -> Result<Booking, EngineError> {
        let customer = validate_customer(&customer).inspect_err(|_| rejected("invalid"))?;
        let _gate = self.commit_gate.read().await;
        let service = self
            .get_service_state(&service_id)
            .ok_or(EngineError::NotFound(service_id))
            .inspect_err(|_| rejected("not_found"))?;
        let mut guard = service.write().await;
        if !self.services.contains_key(&service_id) {
            rejected("not_found");
            return Err(EngineError::NotFound(service_id));
        }
        if !guard.service.active {
            rejected("inactive");
            return Err(EngineError::validation(format!(
                "service {service_id} is not taking bookings"
            )));
        }
        if !guard.has_slot(day, &slot) {
            rejected("unknown_slot");
            return Err(EngineError::validation(format!(
                "{day} {slot} is not offered by this service"
            )));
        }
        let capacity = guard.service.capacity;
        if guard.booked(day, &slot) >= capacity {
            rejected("full");
            return Err(EngineError::CapacityExceeded { capacity });
        }

        let booking = Booking {
            id: Ulid::new(),
            provider_id: guard.service.provider_id,
            service_id,
            service_name: guard.service.name.clone(),
            day,
            slot,
            customer,
            created_at: now_ms(),
        };
        self.wal_append(&Event::BookingAdmitted {
            booking: booking.clone(),
        })
        .await
        .inspect_err(|_| rejected("wal"))?;

        *guard.seats.entry((day, slot)).or_insert(0) += 1;
        self.bookings
            .entry(booking.provider_id)
            .or_default()
            .push(booking.clone());
        metrics::counter!(BOOKINGS_ADMITTED_TOTAL).increment(1);
        tracing::debug!(
            "admitted booking {} on {service_id} {day} {slot} ({}/{capacity})",
            booking.id,
            guard.booked(day, &slot)
        );
        Ok(booking)
    }

    /// Days with at least one open slot. Empty for unknown or inactive services.
    pub async fn available_days_for_service(&self, service_id: Ulid) -> BTreeSet<Day> {
        let Some(service) = self.get_service_state(&service_id) else {
            return BTreeSet::new();
        };
        let guard = service.read().await;
        if !guard.service.active {
            return BTreeSet::new();
        }
        guard
            .days
            .iter()
            .filter(|d| {
                d.slots
                    .iter()
                    .any(|s| guard.booked(d.row.day, &s.slot) < guard.service.capacity)
            })
            .map(|d| d.row.day)
            .collect()
    }

    /// Configured slots for `day`, in schedule order.
    pub async fn list_slots(&self, service_id: Ulid, day: Day) -> Result<Vec<SlotInfo>, EngineError> {
        let service = self
            .get_service_state(&service_id)
            .ok_or(EngineError::NotFound(service_id))?;
        let guard = service.read().await;
        Ok(slot_infos(&guard, day))
    }
}
