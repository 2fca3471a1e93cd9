use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use tokio::sync::{oneshot, RwLock};
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::{PROVIDERS_REGISTERED_TOTAL, SCHEDULE_COMMITS_TOTAL, WAL_COMPACTIONS_TOTAL};

use super::txn::UnitOfWork;
use super::validate::{validate_provider, validate_spec};
use super::{Engine, EngineError, WalCommand};

impl Engine {
    pub async fn register_provider(
        &self,
        name: &str,
        profile: ProviderProfile,
    ) -> Result<Provider, EngineError> {
        let (name, profile) = validate_provider(name, &profile)?;
        if self.providers.len() >= MAX_PROVIDERS {
            return Err(EngineError::LimitExceeded("too many providers"));
        }
        let _gate = self.commit_gate.read().await;

        let provider = Provider {
            id: Ulid::new(),
            name,
            profile,
        };
        // Reserve the name before the WAL write so two registrations can't race.
        match self.provider_names.entry(provider.name.clone()) {
            Entry::Occupied(_) => return Err(EngineError::AlreadyExists(provider.name)),
            Entry::Vacant(slot) => {
                slot.insert(provider.id);
            }
        }

        let event = Event::ProviderRegistered {
            provider: provider.clone(),
        };
        if let Err(e) = self.wal_append(&event).await {
            self.provider_names.remove(&provider.name);
            return Err(e);
        }
        self.providers.insert(
            provider.id,
            Arc::new(RwLock::new(ProviderState::new(provider.clone()))),
        );
        metrics::counter!(PROVIDERS_REGISTERED_TOTAL).increment(1);
        info!("registered provider {} ({})", provider.id, provider.name);
        Ok(provider)
    }

    /// Create a service with its staff and weekly schedule in one unit of work.
    pub async fn create_service(&self, provider_id: Ulid, spec: ServiceSpec) -> Result<Ulid, EngineError> {
        let checked = validate_spec(&spec)?;
        let _gate = self.commit_gate.read().await;
        let provider = self.provider_or_not_found(&provider_id)?;
        let mut guard = provider.write().await;
        if guard.services.len() >= MAX_SERVICES_PER_PROVIDER {
            return Err(EngineError::LimitExceeded("too many services for provider"));
        }

        let service_id = Ulid::new();
        let mut uow = UnitOfWork::begin(&guard, None);
        let staff_id = uow.resolve_staff(&checked.staff)?;
        uow.stage(Change::ServiceInserted {
            service: Service {
                id: service_id,
                provider_id,
                name: checked.name,
                description: checked.description,
                capacity: checked.capacity,
                staff_id,
                active: true,
            },
        })?;
        uow.stage_schedule(service_id, &checked.schedule)?;

        self.commit_schedule(provider_id, service_id, &mut guard, None, uow)
            .await?;
        metrics::counter!(SCHEDULE_COMMITS_TOTAL, "op" => "create").increment(1);
        info!("created service {service_id} for provider {provider_id}");
        Ok(service_id)
    }

    /// Replace a service's fields and schedule. The old schedule rows are
    /// removed and the new ones inserted inside the same unit of work; seat
    /// counts and bookings are left alone.
    pub async fn update_service(
        &self,
        provider_id: Ulid,
        service_id: Ulid,
        spec: ServiceSpec,
    ) -> Result<(), EngineError> {
        let checked = validate_spec(&spec)?;
        let _gate = self.commit_gate.read().await;
        let provider = self.provider_or_not_found(&provider_id)?;
        let mut guard = provider.write().await;
        let service = self
            .get_service_state(&service_id)
            .ok_or(EngineError::NotFoundOrUnauthorized(service_id))?;
        let mut sguard = service.write().await;
        if !self.services.contains_key(&service_id) {
            return Err(EngineError::NotFoundOrUnauthorized(service_id));
        }

        let mut uow = UnitOfWork::begin(&guard, Some(&*sguard));
        let staff_id = uow.resolve_staff(&checked.staff)?;
        uow.stage(Change::ServiceUpdated {
            id: service_id,
            name: checked.name,
            capacity: checked.capacity,
            description: checked.description,
            staff_id,
        })?;
        uow.stage_clear_schedule(service_id)?;
        uow.stage_schedule(service_id, &checked.schedule)?;

        self.commit_schedule(provider_id, service_id, &mut guard, Some(&mut *sguard), uow)
            .await?;
        metrics::counter!(SCHEDULE_COMMITS_TOTAL, "op" => "update").increment(1);
        info!("updated service {service_id} for provider {provider_id}");
        Ok(())
    }

    pub async fn disable_service(&self, provider_id: Ulid, service_id: Ulid) -> Result<(), EngineError> {
        self.set_service_active(provider_id, service_id, false).await?;
        metrics::counter!(SCHEDULE_COMMITS_TOTAL, "op" => "disable").increment(1);
        info!("disabled service {service_id}");
        Ok(())
    }

    pub async fn reactivate_service(&self, provider_id: Ulid, service_id: Ulid) -> Result<(), EngineError> {
        self.set_service_active(provider_id, service_id, true).await?;
        metrics::counter!(SCHEDULE_COMMITS_TOTAL, "op" => "reactivate").increment(1);
        info!("reactivated service {service_id}");
        Ok(())
    }

    /// Setting the flag to its current value still succeeds.
    async fn set_service_active(
        &self,
        provider_id: Ulid,
        service_id: Ulid,
        active: bool,
    ) -> Result<(), EngineError> {
        let _gate = self.commit_gate.read().await;
        let provider = self.provider_or_not_found(&provider_id)?;
        let mut guard = provider.write().await;
        let service = self
            .get_service_state(&service_id)
            .ok_or(EngineError::NotFoundOrUnauthorized(service_id))?;
        let mut sguard = service.write().await;
        if !self.services.contains_key(&service_id) {
            return Err(EngineError::NotFoundOrUnauthorized(service_id));
        }

        let mut uow = UnitOfWork::begin(&guard, Some(&*sguard));
        uow.stage(Change::ServiceActiveSet { id: service_id, active })?;
        self.commit_schedule(provider_id, service_id, &mut guard, Some(&mut *sguard), uow)
            .await
    }

    /// Delete a service and its schedule rows, children first. Bookings are
    /// kept in the ledger.
    pub async fn delete_service(&self, provider_id: Ulid, service_id: Ulid) -> Result<(), EngineError> {
        let _gate = self.commit_gate.read().await;
        let provider = self.provider_or_not_found(&provider_id)?;
        let mut guard = provider.write().await;
        let service = self
            .get_service_state(&service_id)
            .ok_or(EngineError::NotFoundOrUnauthorized(service_id))?;
        let mut sguard = service.write().await;
        if !self.services.contains_key(&service_id) {
            return Err(EngineError::NotFoundOrUnauthorized(service_id));
        }

        let mut uow = UnitOfWork::begin(&guard, Some(&*sguard));
        uow.stage_clear_schedule(service_id)?;
        uow.stage(Change::ServiceDeleted { id: service_id })?;

        self.commit_schedule(provider_id, service_id, &mut guard, Some(&mut *sguard), uow)
            .await?;
        metrics::counter!(SCHEDULE_COMMITS_TOTAL, "op" => "delete").increment(1);
        info!("deleted service {service_id} for provider {provider_id}");
        Ok(())
    }

    /// Persist a staged unit of work as one WAL record, then make it live.
    /// Nothing becomes visible if the write fails.
    async fn commit_schedule(
        &self,
        provider_id: Ulid,
        service_id: Ulid,
        provider: &mut ProviderState,
        service: Option<&mut ServiceState>,
        uow: UnitOfWork,
    ) -> Result<(), EngineError> {
        let (changes, staged) = uow.finish();
        let event = Event::ScheduleCommitted {
            provider_id,
            service_id,
            changes,
        };
        self.wal_append(&event).await.inspect_err(|e| {
            tracing::warn!("rolled back unit of work on service {service_id}: {e}");
        })?;
        self.install(provider, service, service_id, staged);
        Ok(())
    }

    /// Rewrite the WAL as the minimal record set that rebuilds current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.commit_gate.write().await;
        let mut events = Vec::new();

        let providers: Vec<_> = self.providers.iter().map(|e| e.value().clone()).collect();
        for provider in providers {
            let guard = provider.read().await;
            let provider_id = guard.provider.id;
            events.push(Event::ProviderRegistered {
                provider: guard.provider.clone(),
            });
            if !guard.staff.is_empty() {
                events.push(Event::StaffResolved {
                    provider_id,
                    changes: guard
                        .staff
                        .iter()
                        .map(|staff| Change::StaffInserted { staff: staff.clone() })
                        .collect(),
                });
            }
            for service_id in &guard.services {
                let Some(service) = self.get_service_state(service_id) else {
                    continue;
                };
                let sguard = service.read().await;
                let mut changes = vec![Change::ServiceInserted {
                    service: sguard.service.clone(),
                }];
                for day in &sguard.days {
                    changes.push(Change::DayInserted { day: day.row.clone() });
                    changes.push(Change::SlotsInserted {
                        day_id: day.row.id,
                        slots: day.slots.clone(),
                    });
                }
                events.push(Event::ScheduleCommitted {
                    provider_id,
                    service_id: *service_id,
                    changes,
                });
            }
        }

        // Bookings last so seat counts rebuild against existing services.
        for ledger in self.bookings.iter() {
            for booking in ledger.value() {
                events.push(Event::BookingAdmitted {
                    booking: booking.clone(),
                });
            }
        }

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        metrics::counter!(WAL_COMPACTIONS_TOTAL).increment(1);
        info!("compacted WAL to {count} records");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
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
}
