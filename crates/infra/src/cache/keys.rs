//! Cache key schema.
//!
//! ```text
//! hub:{hub_id}
//! hub:code:{tenant_id}:{code}
//! sku:{sku_id}
//! sku:code:{tenant_id}:{code}
//! inventory:{tenant_id}:item:{hub_code}:{sku_code}
//! inventory:{tenant_id}:list:p{page}:s{page_size}
//! ```
//!
//! Codes are escaped (`\` → `\\`, `:` → `\:`), so a code never contains a bare
//! separator and no two distinct `(hub, sku)` pairs share a key or a prefix.

use std::borrow::Cow;

use hubstock_core::{HubId, PageRequest, SkuId, TenantId};

fn code(raw: &str) -> Cow<'_, str> {
    if !raw.contains([':', '\\']) {
        return Cow::Borrowed(raw);
    }
    let mut escaped = String::with_capacity(raw.len() + 4);
    for c in raw.chars() {
        if matches!(c, ':' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    Cow::Owned(escaped)
}

pub fn hub_by_id(id: HubId) -> String {
    format!("hub:{id}")
}

pub fn hub_by_code(tenant_id: TenantId, code_value: &str) -> String {
    format!("hub:code:{tenant_id}:{}", code(code_value))
}

pub fn sku_by_id(id: SkuId) -> String {
    format!("sku:{id}")
}

pub fn sku_by_code(tenant_id: TenantId, code_value: &str) -> String {
    format!("sku:code:{tenant_id}:{}", code(code_value))
}

pub fn inventory_item(tenant_id: TenantId, hub_code: &str, sku_code: &str) -> String {
    format!("inventory:{tenant_id}:item:{}:{}", code(hub_code), code(sku_code))
}

pub fn inventory_listing(tenant_id: TenantId, page: PageRequest) -> String {
    format!("inventory:{tenant_id}:list:p{}:s{}", page.page, page.page_size)
}

/// Every cached listing page of a tenant.
pub fn inventory_listing_prefix(tenant_id: TenantId) -> String {
    format!("inventory:{tenant_id}:list:")
}

/// Every cached point query of a tenant at one hub.
pub fn inventory_hub_items_prefix(tenant_id: TenantId, hub_code: &str) -> String {
    format!("inventory:{tenant_id}:item:{}:", code(hub_code))
}

/// Everything inventory-related cached for a tenant.
pub fn inventory_prefix(tenant_id: TenantId) -> String {
    format!("inventory:{tenant_id}:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_keys_fall_under_the_listing_prefix() {
        let tenant = TenantId::new();
        let key = inventory_listing(tenant, PageRequest::new(2, 50));
        assert!(key.starts_with(&inventory_listing_prefix(tenant)));
        assert!(key.ends_with(":p2:s50"));
        assert!(!inventory_item(tenant, "H1", "S1").starts_with(&inventory_listing_prefix(tenant)));
    }

    #[test]
    fn hub_item_prefix_does_not_match_longer_hub_codes() {
        let tenant = TenantId::new();
        let prefix = inventory_hub_items_prefix(tenant, "H1");
        assert!(inventory_item(tenant, "H1", "S1").starts_with(&prefix));
        assert!(!inventory_item(tenant, "H10", "S1").starts_with(&prefix));
    }

    #[test]
    fn separators_inside_codes_do_not_collide() {
        let tenant = TenantId::new();
        assert_ne!(inventory_item(tenant, "A:B", "C"), inventory_item(tenant, "A", "B:C"));
        assert_ne!(inventory_item(tenant, "A\\", "C"), inventory_item(tenant, "A", "\\C"));
        assert_eq!(inventory_item(tenant, "A:B", "C"), format!("inventory:{tenant}:item:A\\:B:C"));

        let prefix = inventory_hub_items_prefix(tenant, "A");
        assert!(inventory_item(tenant, "A", "B:C").starts_with(&prefix));
        assert!(!inventory_item(tenant, "A:B", "C").starts_with(&prefix));
        assert!(!inventory_item(tenant, "A\\", "C").starts_with(&prefix));

        assert_ne!(hub_by_code(tenant, "x:y"), hub_by_code(tenant, "x\\:y"));
        assert_ne!(sku_by_code(tenant, "x:y"), sku_by_code(tenant, "x\\:y"));
    }
}
