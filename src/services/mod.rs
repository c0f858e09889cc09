use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::user::UserRole;
use crate::errors::ServiceError;

pub mod commission_rates;
pub mod compensation;
pub mod payments;
pub mod payout_batches;
pub mod response_deadlines;
pub mod work_orders;

/// Caller identity, already authenticated by the upstream gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: UserRole,
}

impl Actor {
    pub fn new(id: Uuid, role: UserRole) -> Self {
        Self { id, role }
    }

    /// Identity used by background loops.
    pub fn system() -> Self {
        Self {
            id: Uuid::nil(),
            role: UserRole::Admin,
        }
    }

    pub fn is_system(&self) -> bool {
        self.id.is_nil()
    }

    /// Id to record as the acting user; `None` for background work.
    pub fn recorded_id(&self) -> Option<Uuid> {
        (!self.is_system()).then_some(self.id)
    }

    pub fn is_staff(&self) -> bool {
        matches!(self.role, UserRole::Admin | UserRole::Dispatcher)
    }

    pub fn require_staff(&self, action: &str) -> Result<(), ServiceError> {
        if self.is_staff() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(format!(
                "only dispatchers or admins may {}",
                action
            )))
        }
    }

    pub fn require_admin(&self, action: &str) -> Result<(), ServiceError> {
        if self.role == UserRole::Admin {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(format!("only admins may {}", action)))
        }
    }

    /// Technicians see their own records; staff see everyone's.
    pub fn require_self_or_staff(&self, technician_id: Uuid) -> Result<(), ServiceError> {
        if self.is_staff() || self.id == technician_id {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(
                "cannot access another technician's records".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staff_checks() {
        let dispatcher = Actor::new(Uuid::new_v4(), UserRole::Dispatcher);
        let technician = Actor::new(Uuid::new_v4(), UserRole::Technician);

        assert!(dispatcher.require_staff("assign").is_ok());
        assert!(dispatcher.require_admin("adjust wallets").is_err());
        assert!(matches!(
            technician.require_staff("assign"),
            Err(ServiceError::Forbidden(_))
        ));
        assert!(technician.require_self_or_staff(technician.id).is_ok());
        assert!(technician.require_self_or_staff(Uuid::new_v4()).is_err());
    }

    #[test]
    fn system_actor_records_no_id() {
        assert_eq!(Actor::system().recorded_id(), None);
        let admin = Actor::new(Uuid::new_v4(), UserRole::Admin);
        assert_eq!(admin.recorded_id(), Some(admin.id));
    }
}
