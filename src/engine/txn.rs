use ulid::Ulid;

use crate::model::*;

use super::EngineError;

/// Private copy of the rows one unit of work may touch: a provider and at
/// most one of its services. `service == None` means "no such row".
#[derive(Debug, Clone)]
pub(crate) struct Staged {
    pub provider: ProviderState,
    pub service: Option<ServiceState>,
}

fn owned_service<'a>(
    staged: &'a mut Staged,
    id: &Ulid,
) -> Option<&'a mut ServiceState> {
    let provider_id = staged.provider.provider.id;
    staged
        .service
        .as_mut()
        .filter(|s| s.service.id == *id && s.service.provider_id == provider_id)
}

/// Apply one row change, enforcing the referential rules of the logical
/// tables. Used both while staging a live unit of work and during replay.
pub(crate) fn apply_change(staged: &mut Staged, change: &Change) -> Result<(), EngineError> {
    match change {
        Change::StaffInserted { staff } => {
            if staff.provider_id != staged.provider.provider.id {
                return Err(EngineError::Constraint("staff row for another provider"));
            }
            if staged.provider.staff(&staff.id).is_some() {
                return Err(EngineError::Constraint("duplicate staff id"));
            }
            let who = StaffRef::new(&staff.first_name, &staff.last_name, &staff.role);
            if staged.provider.find_staff(&who).is_some() {
                return Err(EngineError::Constraint("duplicate staff identity"));
            }
            staged.provider.staff.push(staff.clone());
        }
        Change::ServiceInserted { service } => {
            if staged.service.is_some() {
                return Err(EngineError::Constraint("duplicate service id"));
            }
            if service.provider_id != staged.provider.provider.id {
                return Err(EngineError::Constraint("service row for another provider"));
            }
            if staged.provider.staff(&service.staff_id).is_none() {
                return Err(EngineError::Constraint("services references missing staff"));
            }
            staged.provider.services.insert(service.id);
            staged.service = Some(ServiceState::new(service.clone()));
        }
        Change::ServiceUpdated {
            id,
            name,
            capacity,
            description,
            staff_id,
        } => {
            if staged.provider.staff(staff_id).is_none() {
                return Err(EngineError::Constraint("services references missing staff"));
            }
            let state =
                owned_service(staged, id).ok_or(EngineError::NotFoundOrUnauthorized(*id))?;
            state.service.name = name.clone();
            state.service.capacity = *capacity;
            state.service.description = description.clone();
            state.service.staff_id = *staff_id;
        }
        Change::ServiceActiveSet { id, active } => {
            let state =
                owned_service(staged, id).ok_or(EngineError::NotFoundOrUnauthorized(*id))?;
            state.service.active = *active;
        }
        Change::SlotsDeleted { service_id } => {
            // Zero matching rows is not an error at this step.
            if let Some(state) = owned_service(staged, service_id) {
                for day in &mut state.days {
                    day.slots.clear();
                }
            }
        }
        Change::DaysDeleted { service_id } => {
            if let Some(state) = owned_service(staged, service_id) {
                if state.days.iter().any(|d| !d.slots.is_empty()) {
                    return Err(EngineError::Constraint(
                        "service_days still referenced by time_slots",
                    ));
                }
                state.days.clear();
            }
        }
        Change::ServiceDeleted { id } => {
            let state =
                owned_service(staged, id).ok_or(EngineError::NotFoundOrUnauthorized(*id))?;
            if !state.days.is_empty() {
                return Err(EngineError::Constraint(
                    "services still referenced by service_days",
                ));
            }
            staged.provider.services.remove(id);
            staged.service = None;
        }
        Change::DayInserted { day } => {
            let state = owned_service(staged, &day.service_id)
                .ok_or(EngineError::Constraint("service_days references missing service"))?;
            if state.days.iter().any(|d| d.row.day == day.day) {
                return Err(EngineError::Constraint("duplicate day for service"));
            }
            let pos = state.days.partition_point(|d| d.row.day < day.day);
            state.days.insert(
                pos,
                DayState {
                    row: day.clone(),
                    slots: Vec::new(),
                },
            );
        }
        Change::SlotsInserted { day_id, slots } => {
            let day = staged
                .service
                .as_mut()
                .and_then(|s| s.days.iter_mut().find(|d| d.row.id == *day_id))
                .ok_or(EngineError::Constraint("time_slots references missing service day"))?;
            if slots.iter().any(|s| s.day_id != *day_id) {
                return Err(EngineError::Constraint("time_slots batch spans several days"));
            }
            day.slots.extend(slots.iter().cloned());
        }
    }
    Ok(())
}

/// An open unit of work. Changes are applied to the staged copy as they are
/// staged; the live state is untouched until the caller commits.
pub(crate) struct UnitOfWork {
    staged: Staged,
    changes: Vec<Change>,
}

impl UnitOfWork {
    pub fn begin(provider: &ProviderState, service: Option<&ServiceState>) -> Self {
        Self {
            staged: Staged {
                provider: provider.clone(),
                service: service.cloned(),
            },
            changes: Vec::new(),
        }
    }

    pub fn stage(&mut self, change: Change) -> Result<(), EngineError> {
        apply_change(&mut self.staged, &change)?;
        self.changes.push(change);
        Ok(())
    }

    pub fn provider(&self) -> &ProviderState {
        &self.staged.provider
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Insert one day row followed by its slot rows, for every day in `schedule`.
    pub fn stage_schedule(&mut self, service_id: Ulid, schedule: &Schedule) -> Result<(), EngineError> {
        for (day, slots) in schedule {
            let day_id = Ulid::new();
            self.stage(Change::DayInserted {
                day: ServiceDay {
                    id: day_id,
                    service_id,
                    day: *day,
                },
            })?;
            let rows = slots
                .iter()
                .map(|slot| SlotRow {
                    id: Ulid::new(),
                    day_id,
                    slot: *slot,
                })
                .collect();
            self.stage(Change::SlotsInserted { day_id, slots: rows })?;
        }
        Ok(())
    }

    /// Delete slot rows, then day rows.
    pub fn stage_clear_schedule(&mut self, service_id: Ulid) -> Result<(), EngineError> {
        self.stage(Change::SlotsDeleted { service_id })?;
        self.stage(Change::DaysDeleted { service_id })
    }

    pub fn finish(self) -> (Vec<Change>, Staged) {
        (self.changes, self.staged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> ProviderState {
        ProviderState::new(Provider {
            id: Ulid::new(),
            name: "Sharp Cuts".into(),
            profile: ProviderProfile::default(),
        })
    }

    fn staff_for(p: &ProviderState) -> Staff {
        Staff {
            id: Ulid::new(),
            provider_id: p.provider.id,
            first_name: "Ana".into(),
            last_name: "Ruiz".into(),
            role: "Barber".into(),
        }
    }

    fn service_for(p: &ProviderState, staff_id: Ulid) -> Service {
        Service {
            id: Ulid::new(),
            provider_id: p.provider.id,
            name: "Haircut".into(),
            description: "Wash and cut".into(),
            capacity: 2,
            staff_id,
            active: true,
        }
    }

    fn slot(label: &str) -> TimeSlot {
        TimeSlot::parse_label(label).unwrap()
    }

    #[test]
    fn day_before_service_is_rejected() {
        let p = provider();
        let mut uow = UnitOfWork::begin(&p, None);
        let err = uow
            .stage(Change::DayInserted {
                day: ServiceDay { id: Ulid::new(), service_id: Ulid::new(), day: Day::Mon },
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::Constraint(_)));
        assert!(uow.is_empty());
    }

    #[test]
    fn service_requires_known_staff() {
        let p = provider();
        let mut uow = UnitOfWork::begin(&p, None);
        let err = uow
            .stage(Change::ServiceInserted { service: service_for(&p, Ulid::new()) })
            .unwrap_err();
        assert!(matches!(err, EngineError::Constraint(_)));
    }

    #[test]
    fn parent_before_children_on_insert() {
        let p = provider();
        let staff = staff_for(&p);
        let service = service_for(&p, staff.id);
        let mut uow = UnitOfWork::begin(&p, None);
        uow.stage(Change::StaffInserted { staff }).unwrap();
        uow.stage(Change::ServiceInserted { service: service.clone() }).unwrap();

        let mut schedule = Schedule::new();
        schedule.insert(Day::Tue, vec![slot("09:00 - 10:00")]);
        schedule.insert(Day::Mon, vec![slot("13:00 - 14:00"), slot("10:00 - 11:00")]);
        uow.stage_schedule(service.id, &schedule).unwrap();

        let (changes, staged) = uow.finish();
        assert_eq!(changes.len(), 2 + 4);
        let state = staged.service.unwrap();
        assert_eq!(state.schedule(), schedule);
        // Days kept sorted regardless of insert order.
        assert_eq!(state.days[0].row.day, Day::Mon);
        assert!(staged.provider.services.contains(&service.id));
    }

    #[test]
    fn deleting_days_with_slots_is_a_constraint_failure() {
        let p = provider();
        let staff = staff_for(&p);
        let service = service_for(&p, staff.id);
        let mut uow = UnitOfWork::begin(&p, None);
        uow.stage(Change::StaffInserted { staff }).unwrap();
        uow.stage(Change::ServiceInserted { service: service.clone() }).unwrap();
        let mut schedule = Schedule::new();
        schedule.insert(Day::Mon, vec![slot("09:00 - 10:00")]);
        uow.stage_schedule(service.id, &schedule).unwrap();

        let err = uow
            .stage(Change::DaysDeleted { service_id: service.id })
            .unwrap_err();
        assert!(matches!(err, EngineError::Constraint(_)));

        let err = uow.stage(Change::ServiceDeleted { id: service.id }).unwrap_err();
        assert!(matches!(err, EngineError::Constraint(_)));

        uow.stage_clear_schedule(service.id).unwrap();
        uow.stage(Change::ServiceDeleted { id: service.id }).unwrap();
        let (_, staged) = uow.finish();
        assert!(staged.service.is_none());
        assert!(staged.provider.services.is_empty());
    }

    #[test]
    fn foreign_service_looks_missing() {
        let owner = provider();
        let staff = staff_for(&owner);
        let mut state = ServiceState::new(service_for(&owner, staff.id));
        state.service.active = true;

        let intruder = provider();
        let mut uow = UnitOfWork::begin(&intruder, Some(&state));
        let id = state.service.id;
        let err = uow
            .stage(Change::ServiceActiveSet { id, active: false })
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFoundOrUnauthorized(x) if x == id));

        // Cascade steps on a foreign service touch nothing.
        uow.stage_clear_schedule(id).unwrap();
        let err = uow.stage(Change::ServiceDeleted { id }).unwrap_err();
        assert!(matches!(err, EngineError::NotFoundOrUnauthorized(_)));
    }

    #[test]
    fn duplicate_staff_identity_rejected() {
        let p = provider();
        let mut uow = UnitOfWork::begin(&p, None);
        uow.stage(Change::StaffInserted { staff: staff_for(&p) }).unwrap();
        let err = uow
            .stage(Change::StaffInserted { staff: staff_for(&p) })
            .unwrap_err();
        assert!(matches!(err, EngineError::Constraint(_)));
    }
}
