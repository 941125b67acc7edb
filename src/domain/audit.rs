use serde_json::Value;
use uuid::Uuid;

pub const ENTITY_TRANSACTION: &str = "transaction";
pub const ENTITY_PROMO_CODE: &str = "promo_code";
pub const ENTITY_WITHDRAWAL: &str = "withdrawal_request";
pub const ENTITY_ENROLLMENT: &str = "enrollment";
pub const ENTITY_CHECKOUT: &str = "checkout";

/// One row of the audit trail, written in the same unit of work as the change it describes.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub entity_id: Uuid,
    pub entity_type: &'static str,
    pub action: &'static str,
    pub old_val: Option<Value>,
    pub new_val: Option<Value>,
    pub actor: String,
}

impl AuditEntry {
    pub fn created(
        entity_id: Uuid,
        entity_type: &'static str,
        new_val: Value,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            entity_id,
            entity_type,
            action: "created",
            old_val: None,
            new_val: Some(new_val),
            actor: actor.into(),
        }
    }

    pub fn updated(
        entity_id: Uuid,
        entity_type: &'static str,
        old_val: Value,
        new_val: Value,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            entity_id,
            entity_type,
            action: "updated",
            old_val: Some(old_val),
            new_val: Some(new_val),
            actor: actor.into(),
        }
    }

    pub fn deleted(
        entity_id: Uuid,
        entity_type: &'static str,
        old_val: Value,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            entity_id,
            entity_type,
            action: "deleted",
            old_val: Some(old_val),
            new_val: None,
            actor: actor.into(),
        }
    }
}
