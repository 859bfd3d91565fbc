use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hubstock_core::{CatalogEntity, EntityKind, HubId, LedgerResult, TenantId};

use crate::validation::{
    max_len, require_code, require_name, MAX_ADDRESS_LEN, MAX_DESCRIPTION_LEN, MAX_SHORT_FIELD_LEN,
};

/// Postal location of a hub.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubAddress {
    pub address: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub postal_code: String,
}

impl HubAddress {
    fn validate(&self) -> LedgerResult<()> {
        max_len(EntityKind::Hub, "address", &self.address, MAX_ADDRESS_LEN)?;
        max_len(EntityKind::Hub, "city", &self.city, MAX_SHORT_FIELD_LEN)?;
        max_len(EntityKind::Hub, "state", &self.state, MAX_SHORT_FIELD_LEN)?;
        max_len(EntityKind::Hub, "country", &self.country, MAX_SHORT_FIELD_LEN)?;
        max_len(EntityKind::Hub, "postal_code", &self.postal_code, 20)
    }
}

/// A distribution hub holding stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hub {
    pub id: HubId,
    pub tenant_id: TenantId,
    pub code: String,
    pub name: String,
    pub description: String,
    pub is_active: bool,
    pub address: HubAddress,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Input for creating a hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewHub {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub address: HubAddress,
}

fn default_active() -> bool {
    true
}

impl NewHub {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            description: String::new(),
            is_active: true,
            address: HubAddress::default(),
        }
    }

    pub fn validate(&self) -> LedgerResult<()> {
        require_code(EntityKind::Hub, &self.code)?;
        require_name(EntityKind::Hub, &self.name)?;
        max_len(EntityKind::Hub, "description", &self.description, MAX_DESCRIPTION_LEN)?;
        self.address.validate()
    }
}

/// Partial update of a hub. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubChanges {
    pub code: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
    pub address: Option<HubAddress>,
}

impl Hub {
    /// Build a new live hub from validated input.
    pub fn create(tenant_id: TenantId, id: HubId, input: NewHub, now: DateTime<Utc>) -> LedgerResult<Self> {
        input.validate()?;
        Ok(Self {
            id,
            tenant_id,
            code: input.code,
            name: input.name,
            description: input.description,
            is_active: input.is_active,
            address: input.address,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    /// Return the hub with `changes` applied, validated as a whole.
    pub fn with_changes(&self, changes: HubChanges, now: DateTime<Utc>) -> LedgerResult<Self> {
        let mut next = self.clone();
        if let Some(code) = changes.code {
            next.code = code;
        }
        if let Some(name) = changes.name {
            next.name = name;
        }
        if let Some(description) = changes.description {
            next.description = description;
        }
        if let Some(is_active) = changes.is_active {
            next.is_active = is_active;
        }
        if let Some(address) = changes.address {
            next.address = address;
        }

        require_code(EntityKind::Hub, &next.code)?;
        require_name(EntityKind::Hub, &next.name)?;
        max_len(EntityKind::Hub, "description", &next.description, MAX_DESCRIPTION_LEN)?;
        next.address.validate()?;

        next.updated_at = now;
        Ok(next)
    }
}

impl CatalogEntity for Hub {
    type Id = HubId;

    const KIND: EntityKind = EntityKind::Hub;

    fn id(&self) -> HubId {
        self.id
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn code(&self) -> &str {
        &self.code
    }

    fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubstock_core::ErrorKind;

    fn hub() -> Hub {
        Hub::create(TenantId::new(), HubId::new(), NewHub::new("H1", "North"), Utc::now()).unwrap()
    }

    #[test]
    fn create_requires_code_and_name() {
        let err = Hub::create(TenantId::new(), HubId::new(), NewHub::new("", "x"), Utc::now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = Hub::create(TenantId::new(), HubId::new(), NewHub::new("H1", " "), Utc::now()).unwrap_err();
        assert!(err.to_string().contains("hub name is required"));
    }

    #[test]
    fn changes_touch_only_given_fields() {
        let original = hub();
        let changed = original
            .with_changes(
                HubChanges {
                    name: Some("South".to_string()),
                    ..HubChanges::default()
                },
                Utc::now(),
            )
            .unwrap();

        assert_eq!(changed.id, original.id);
        assert_eq!(changed.code, "H1");
        assert_eq!(changed.name, "South");
        assert!(changed.updated_at >= original.updated_at);
    }

    #[test]
    fn changes_cannot_blank_the_code() {
        let err = hub()
            .with_changes(
                HubChanges {
                    code: Some(String::new()),
                    ..HubChanges::default()
                },
                Utc::now(),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
