use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError};

fn view(state: &ServiceState, staff: Staff) -> ServiceView {
    ServiceView {
        id: state.service.id,
        provider_id: state.service.provider_id,
        name: state.service.name.clone(),
        description: state.service.description.clone(),
        capacity: state.service.capacity,
        active: state.service.active,
        staff,
        schedule: state.schedule(),
    }
}

impl Engine {
    /// Look a provider up by display name. A name still being registered
    /// resolves to nothing until its WAL write lands.
    pub async fn resolve_provider(&self, name: &str) -> Option<Provider> {
        let id = *self.provider_names.get(name.trim())?;
        let provider = self.get_provider_state(&id)?;
        let guard = provider.read().await;
        Some(guard.provider.clone())
    }

    pub async fn get_provider(&self, id: Ulid) -> Result<Provider, EngineError> {
        let provider = self.provider_or_not_found(&id)?;
        let guard = provider.read().await;
        Ok(guard.provider.clone())
    }

    /// Active services in creation order. Unknown providers have none.
    pub async fn list_active_services(&self, provider_id: Ulid) -> Result<Vec<ServiceView>, EngineError> {
        let mut views = self.collect_services(provider_id).await?;
        views.retain(|v| v.active);
        Ok(views)
    }

    /// Every service of the provider, disabled ones included.
    pub async fn list_services(&self, provider_id: Ulid) -> Result<Vec<ServiceView>, EngineError> {
        if !self.providers.contains_key(&provider_id) {
            return Err(EngineError::NotFound(provider_id));
        }
        self.collect_services(provider_id).await
    }

    async fn collect_services(&self, provider_id: Ulid) -> Result<Vec<ServiceView>, EngineError> {
        let Some(provider) = self.get_provider_state(&provider_id) else {
            return Ok(Vec::new());
        };
        let guard = provider.read().await;
        let mut views = Vec::with_capacity(guard.services.len());
        for service_id in &guard.services {
            let Some(service) = self.get_service_state(service_id) else {
                continue;
            };
            let sguard = service.read().await;
            let staff = guard
                .staff(&sguard.service.staff_id)
                .cloned()
                .ok_or(EngineError::Constraint("services references missing staff"))?;
            views.push(view(&sguard, staff));
        }
        Ok(views)
    }

    pub async fn get_service(&self, service_id: Ulid) -> Result<ServiceView, EngineError> {
        let service = self
            .get_service_state(&service_id)
            .ok_or(EngineError::NotFound(service_id))?;
        // Copy out and release before touching the provider lock.
        let (snapshot, provider_id, staff_id) = {
            let sguard = service.read().await;
            (sguard.clone(), sguard.service.provider_id, sguard.service.staff_id)
        };
        let provider = self.provider_or_not_found(&provider_id)?;
        let guard = provider.read().await;
        let staff = guard
            .staff(&staff_id)
            .cloned()
            .ok_or(EngineError::Constraint("services references missing staff"))?;
        Ok(view(&snapshot, staff))
    }

    /// Booking history, oldest first.
    pub fn list_bookings(&self, provider_id: Ulid) -> Vec<Booking> {
        let mut bookings = self
            .bookings
            .get(&provider_id)
            .map(|ledger| ledger.value().clone())
            .unwrap_or_default();
        bookings.sort_by_key(|b| b.created_at);
        bookings
    }
}
