use serde::{Deserialize, Serialize};

use hubstock_core::{HubId, InventoryRecordId, Page, PageRequest, SellerId, SkuId};

use crate::record::Counters;

/// Listing filter. Every field narrows the tenant's inventory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryFilter {
    pub hub_code: Option<String>,
    pub seller_id: Option<SellerId>,
    #[serde(default)]
    pub sku_codes: Vec<String>,
    #[serde(default)]
    pub page: PageRequest,
}

impl InventoryFilter {
    /// Only plain pagination, no secondary filters. Such listings are cacheable.
    pub fn is_unfiltered(&self) -> bool {
        self.hub_code.is_none() && self.seller_id.is_none() && self.sku_codes.is_empty()
    }

    /// Requested SKU codes, de-duplicated, in first-seen order.
    pub fn distinct_sku_codes(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.sku_codes
            .iter()
            .filter(|code| seen.insert(code.as_str()))
            .cloned()
            .collect()
    }
}

/// Hub attributes denormalized into listing entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubRef {
    pub id: HubId,
    pub code: String,
    pub name: String,
}

/// SKU attributes denormalized into listing entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuRef {
    pub id: SkuId,
    pub seller_id: SellerId,
    pub code: String,
    pub name: String,
}

/// One listing row.
///
/// Zero entries synthesized for requested-but-unstocked SKUs carry
/// `record_id: None`, and `hub: None` when the listing was not filtered by hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub record_id: Option<InventoryRecordId>,
    pub hub: Option<HubRef>,
    pub sku: SkuRef,
    #[serde(flatten)]
    pub counters: Counters,
}

impl InventoryEntry {
    pub fn synthesized(hub: Option<HubRef>, sku: SkuRef) -> Self {
        Self {
            record_id: None,
            hub,
            sku,
            counters: Counters::ZERO,
        }
    }

    pub fn is_synthesized(&self) -> bool {
        self.record_id.is_none()
    }
}

/// Listing result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryPage {
    #[serde(flatten)]
    pub page: Page<InventoryEntry>,
    /// Requested SKU codes that matched no SKU in the catalog.
    #[serde(default)]
    pub unresolved_sku_codes: Vec<String>,
}

impl InventoryPage {
    pub fn entries(&self) -> &[InventoryEntry] {
        &self.page.items
    }

    pub fn total(&self) -> u64 {
        self.page.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unfiltered_means_pagination_only() {
        let mut filter = InventoryFilter::default();
        assert!(filter.is_unfiltered());
        filter.sku_codes.push("S1".to_string());
        assert!(!filter.is_unfiltered());
    }

    #[test]
    fn duplicate_codes_are_collapsed_in_order() {
        let filter = InventoryFilter {
            sku_codes: vec!["S2".into(), "S1".into(), "S2".into()],
            ..InventoryFilter::default()
        };
        assert_eq!(filter.distinct_sku_codes(), vec!["S2".to_string(), "S1".to_string()]);
    }
}
