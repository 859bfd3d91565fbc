use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hubstock_core::{
    CatalogEntity, EntityKind, LedgerError, LedgerResult, PageRequest, SellerId, SkuId, TenantId,
};

use crate::validation::{max_len, require_code, require_name, MAX_DESCRIPTION_LEN, MAX_SHORT_FIELD_LEN};

/// Physical measurements of one unit. Zero means "not recorded".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub weight: f64,
    pub weight_unit: String,
    pub length: f64,
    pub width: f64,
    pub height: f64,
    pub dimension_unit: String,
}

impl Dimensions {
    fn validate(&self) -> LedgerResult<()> {
        for (field, value) in [
            ("weight", self.weight),
            ("length", self.length),
            ("width", self.width),
            ("height", self.height),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(LedgerError::validation(format!(
                    "sku {field} must be a non-negative number"
                )));
            }
        }
        max_len(EntityKind::Sku, "weight_unit", &self.weight_unit, 20)?;
        max_len(EntityKind::Sku, "dimension_unit", &self.dimension_unit, 20)
    }
}

/// A stock-keeping unit owned by a seller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sku {
    pub id: SkuId,
    pub tenant_id: TenantId,
    pub seller_id: SellerId,
    pub code: String,
    pub name: String,
    pub description: String,
    pub is_active: bool,
    pub barcode: String,
    pub dimensions: Dimensions,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Input for creating a SKU.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSku {
    pub seller_id: SellerId,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub barcode: String,
    #[serde(default)]
    pub dimensions: Dimensions,
}

fn default_active() -> bool {
    true
}

impl NewSku {
    pub fn new(seller_id: SellerId, code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            seller_id,
            code: code.into(),
            name: name.into(),
            description: String::new(),
            is_active: true,
            barcode: String::new(),
            dimensions: Dimensions::default(),
        }
    }

    pub fn validate(&self) -> LedgerResult<()> {
        validate_fields(&self.code, &self.name, &self.description, &self.barcode, &self.dimensions)
    }
}

fn validate_fields(
    code: &str,
    name: &str,
    description: &str,
    barcode: &str,
    dimensions: &Dimensions,
) -> LedgerResult<()> {
    require_code(EntityKind::Sku, code)?;
    require_name(EntityKind::Sku, name)?;
    max_len(EntityKind::Sku, "description", description, MAX_DESCRIPTION_LEN)?;
    max_len(EntityKind::Sku, "barcode", barcode, MAX_SHORT_FIELD_LEN)?;
    dimensions.validate()
}

/// Partial update of a SKU. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkuChanges {
    pub seller_id: Option<SellerId>,
    pub code: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
    pub barcode: Option<String>,
    pub dimensions: Option<Dimensions>,
}

/// Filter for SKU listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuFilter {
    pub seller_id: Option<SellerId>,
    pub is_active: Option<bool>,
    pub page: PageRequest,
}

impl Sku {
    pub fn create(tenant_id: TenantId, id: SkuId, input: NewSku, now: DateTime<Utc>) -> LedgerResult<Self> {
        input.validate()?;
        Ok(Self {
            id,
            tenant_id,
            seller_id: input.seller_id,
            code: input.code,
            name: input.name,
            description: input.description,
            is_active: input.is_active,
            barcode: input.barcode,
            dimensions: input.dimensions,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    /// Return the SKU with `changes` applied, validated as a whole.
    ///
    /// Seller existence is not checked here; the directory does that against
    /// the store.
    pub fn with_changes(&self, changes: SkuChanges, now: DateTime<Utc>) -> LedgerResult<Self> {
        let mut next = self.clone();
        if let Some(seller_id) = changes.seller_id {
            next.seller_id = seller_id;
        }
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
        if let Some(barcode) = changes.barcode {
            next.barcode = barcode;
        }
        if let Some(dimensions) = changes.dimensions {
            next.dimensions = dimensions;
        }

        validate_fields(&next.code, &next.name, &next.description, &next.barcode, &next.dimensions)?;
        next.updated_at = now;
        Ok(next)
    }
}

impl CatalogEntity for Sku {
    type Id = SkuId;

    const KIND: EntityKind = EntityKind::Sku;

    fn id(&self) -> SkuId {
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
    use proptest::prelude::*;

    #[test]
    fn negative_weight_is_rejected() {
        let mut input = NewSku::new(SellerId::new(), "S1", "Shirt");
        input.dimensions.weight = -1.0;
        let err = Sku::create(TenantId::new(), SkuId::new(), input, Utc::now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn seller_can_be_reassigned() {
        let sku = Sku::create(
            TenantId::new(),
            SkuId::new(),
            NewSku::new(SellerId::new(), "S1", "Shirt"),
            Utc::now(),
        )
        .unwrap();
        let other = SellerId::new();
        let changed = sku
            .with_changes(
                SkuChanges {
                    seller_id: Some(other),
                    ..SkuChanges::default()
                },
                Utc::now(),
            )
            .unwrap();
        assert_eq!(changed.seller_id, other);
        assert_eq!(changed.code, "S1");
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: any non-blank code within the length limit is accepted.
        #[test]
        fn reasonable_codes_validate(code in "[A-Za-z0-9_-]{1,100}") {
            let input = NewSku::new(SellerId::new(), code, "Item");
            prop_assert!(input.validate().is_ok());
        }
    }
}
