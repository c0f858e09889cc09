use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ConnectionTrait, DatabaseConnection, EntityTrait,
};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    clock::SharedClock,
    config::CompensationConfig,
    entities::{
        commission::CommissionKind,
        system_setting::{self, Entity as SystemSetting, DEFAULT_BONUS_RATE_KEY, DEFAULT_COMMISSION_RATE_KEY},
        user::{self, EmploymentType, Entity as User},
    },
    errors::ServiceError,
    money::round2,
    services::Actor,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RateSource {
    TechnicianOverride,
    SystemSetting,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedRate {
    pub kind: CommissionKind,
    pub rate: Decimal,
    pub source: RateSource,
}

/// Freelancers earn commission; internal staff earn a bonus. A technician
/// without an employment type is paid as a freelancer.
pub fn kind_for(employment_type: Option<EmploymentType>) -> CommissionKind {
    match employment_type {
        Some(EmploymentType::Internal) => CommissionKind::Bonus,
        Some(EmploymentType::Freelancer) | None => CommissionKind::Commission,
    }
}

/// Three-tier resolution: technician override, then system setting, then fallback.
pub fn resolve_rate(
    use_custom_rate: bool,
    custom_rate: Option<Decimal>,
    system_rate: Option<Decimal>,
    fallback: Decimal,
) -> (Decimal, RateSource) {
    match (use_custom_rate, custom_rate, system_rate) {
        (true, Some(rate), _) => (rate, RateSource::TechnicianOverride),
        (_, _, Some(rate)) => (rate, RateSource::SystemSetting),
        _ => (fallback, RateSource::Fallback),
    }
}

pub fn validate_rate(rate: Decimal) -> Result<(), ServiceError> {
    if rate < Decimal::ZERO || rate > Decimal::ONE {
        return Err(ServiceError::ValidationError(format!(
            "rate must be between 0 and 1, got {}",
            rate
        )));
    }
    Ok(())
}

/// `round2(base × rate)`, refusing inputs that cannot produce a valid earning.
pub fn commission_amount(base: Decimal, rate: Decimal) -> Result<Decimal, ServiceError> {
    if base <= Decimal::ZERO {
        return Err(ServiceError::InvalidCommissionAmount(format!(
            "payment amount must be positive, got {}",
            base
        )));
    }
    if rate < Decimal::ZERO || rate > Decimal::ONE {
        return Err(ServiceError::InvalidCommissionAmount(format!(
            "rate {} is outside 0..=1",
            rate
        )));
    }
    let amount = round2(base * rate);
    if amount < Decimal::ZERO {
        return Err(ServiceError::InvalidCommissionAmount(format!(
            "computed amount {} is negative",
            amount
        )));
    }
    Ok(amount)
}

fn setting_key(kind: CommissionKind) -> &'static str {
    match kind {
        CommissionKind::Commission => DEFAULT_COMMISSION_RATE_KEY,
        CommissionKind::Bonus => DEFAULT_BONUS_RATE_KEY,
    }
}

/// Reads and writes the rates that feed commission calculation.
#[derive(Clone)]
pub struct CommissionRateService {
    db: Arc<DatabaseConnection>,
    config: CompensationConfig,
    clock: SharedClock,
}

impl CommissionRateService {
    pub fn new(db: Arc<DatabaseConnection>, config: CompensationConfig, clock: SharedClock) -> Self {
        Self { db, config, clock }
    }

    pub fn fallback_rate(&self, kind: CommissionKind) -> Decimal {
        match kind {
            CommissionKind::Commission => self.config.fallback_commission_rate,
            CommissionKind::Bonus => self.config.fallback_bonus_rate,
        }
    }

    pub async fn system_rate<C: ConnectionTrait>(
        &self,
        conn: &C,
        kind: CommissionKind,
    ) -> Result<Option<Decimal>, ServiceError> {
        let Some(setting) = SystemSetting::find_by_id(setting_key(kind).to_string())
            .one(conn)
            .await?
        else {
            return Ok(None);
        };

        match Decimal::from_str(setting.value.trim()) {
            Ok(rate) if validate_rate(rate).is_ok() => Ok(Some(rate)),
            _ => {
                warn!(
                    key = %setting.key,
                    value = %setting.value,
                    "ignoring unusable system rate setting"
                );
                Ok(None)
            }
        }
    }

    pub async fn rate_for<C: ConnectionTrait>(
        &self,
        conn: &C,
        technician: &user::Model,
    ) -> Result<ResolvedRate, ServiceError> {
        let kind = kind_for(technician.employment_type);
        let system = self.system_rate(conn, kind).await?;
        let (rate, source) = resolve_rate(
            technician.use_custom_rate,
            technician.custom_rate,
            system,
            self.fallback_rate(kind),
        );
        Ok(ResolvedRate { kind, rate, source })
    }

    #[instrument(skip(self))]
    pub async fn set_system_rate(
        &self,
        actor: &Actor,
        kind: CommissionKind,
        rate: Decimal,
    ) -> Result<system_setting::Model, ServiceError> {
        actor.require_admin("change system rates")?;
        validate_rate(rate)?;

        let key = setting_key(kind).to_string();
        let value = rate.normalize().to_string();
        let now = self.clock.now();
        let db = &*self.db;

        let saved = match SystemSetting::find_by_id(key.clone()).one(db).await? {
            Some(existing) => {
                let mut active: system_setting::ActiveModel = existing.into();
                active.value = Set(value);
                active.updated_at = Set(now);
                active.update(db).await?
            }
            None => {
                system_setting::ActiveModel {
                    key: Set(key),
                    value: Set(value),
                    updated_at: Set(now),
                }
                .insert(db)
                .await?
            }
        };

        info!(key = %saved.key, value = %saved.value, "system rate updated");
        Ok(saved)
    }

    #[instrument(skip(self))]
    pub async fn set_technician_rate(
        &self,
        actor: &Actor,
        technician_id: Uuid,
        rate: Option<Decimal>,
        enabled: bool,
    ) -> Result<user::Model, ServiceError> {
        actor.require_admin("change technician rates")?;
        if let Some(rate) = rate {
            validate_rate(rate)?;
        }
        if enabled && rate.is_none() {
            return Err(ServiceError::ValidationError(
                "a custom rate is required when enabling the override".to_string(),
            ));
        }

        let db = &*self.db;
        let technician = User::find_by_id(technician_id)
            .one(db)
            .await?
            .ok_or(ServiceError::TechnicianNotFound(technician_id))?;
        if !technician.is_technician() {
            return Err(ServiceError::InvalidTechnicianRole(technician_id));
        }

        let mut active: user::ActiveModel = technician.into();
        active.use_custom_rate = Set(enabled);
        active.custom_rate = Set(rate);
        active.updated_at = Set(self.clock.now());
        let updated = active.update(db).await?;

        info!(%technician_id, enabled, rate = ?rate, "technician rate override updated");
        Ok(updated)
    }
}
