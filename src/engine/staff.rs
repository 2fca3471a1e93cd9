use ulid::Ulid;

use crate::limits::MAX_STAFF_PER_PROVIDER;
use crate::model::*;

use super::txn::UnitOfWork;
use super::validate::validate_staff;
use super::{Engine, EngineError};

impl UnitOfWork {
    /// Find the provider's staff member with exactly this identity, or stage
    /// an insert for a new one. Matching is exact on all three fields.
    pub fn resolve_staff(&mut self, who: &StaffRef) -> Result<Ulid, EngineError> {
        if let Some(existing) = self.provider().find_staff(who) {
            return Ok(existing.id);
        }
        if self.provider().staff.len() >= MAX_STAFF_PER_PROVIDER {
            return Err(EngineError::LimitExceeded("too many staff for provider"));
        }
        let staff = Staff {
            id: Ulid::new(),
            provider_id: self.provider().provider.id,
            first_name: who.first_name.clone(),
            last_name: who.last_name.clone(),
            role: who.role.clone(),
        };
        let id = staff.id;
        self.stage(Change::StaffInserted { staff })?;
        Ok(id)
    }
}

impl Engine {
    /// Resolve a staff identity outside of any service edit. A new staff row
    /// is committed as its own unit of work.
    pub async fn resolve_staff(&self, provider_id: Ulid, who: StaffRef) -> Result<Ulid, EngineError> {
        let who = validate_staff(&who)?;
        let _gate = self.commit_gate.read().await;
        let provider = self.provider_or_not_found(&provider_id)?;
        let mut guard = provider.write().await;

        let mut uow = UnitOfWork::begin(&guard, None);
        let staff_id = uow.resolve_staff(&who)?;
        if uow.is_empty() {
            return Ok(staff_id);
        }

        let (changes, staged) = uow.finish();
        self.wal_append(&Event::StaffResolved { provider_id, changes })
            .await?;
        *guard = staged.provider;
        tracing::debug!("staff {staff_id} created for provider {provider_id}");
        Ok(staff_id)
    }
}
