//! Field rules shared by hubs and SKUs.

use hubstock_core::{EntityKind, LedgerError, LedgerResult};

pub const MAX_CODE_LEN: usize = 100;
pub const MAX_NAME_LEN: usize = 255;
pub const MAX_DESCRIPTION_LEN: usize = 1000;
pub const MAX_ADDRESS_LEN: usize = 500;
pub const MAX_SHORT_FIELD_LEN: usize = 100;

pub(crate) fn require_code(entity: EntityKind, code: &str) -> LedgerResult<()> {
    if code.trim().is_empty() {
        return Err(LedgerError::validation(format!("{entity} code is required")));
    }
    max_len(entity, "code", code, MAX_CODE_LEN)
}

pub(crate) fn require_name(entity: EntityKind, name: &str) -> LedgerResult<()> {
    if name.trim().is_empty() {
        return Err(LedgerError::validation(format!("{entity} name is required")));
    }
    max_len(entity, "name", name, MAX_NAME_LEN)
}

pub(crate) fn max_len(entity: EntityKind, field: &str, value: &str, limit: usize) -> LedgerResult<()> {
    if value.chars().count() > limit {
        return Err(LedgerError::validation(format!(
            "{entity} {field} exceeds {limit} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubstock_core::ErrorKind;

    #[test]
    fn blank_code_is_rejected() {
        let err = require_code(EntityKind::Hub, "   ").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("hub code is required"));
    }

    #[test]
    fn limits_count_characters_not_bytes() {
        let code: String = "é".repeat(MAX_CODE_LEN);
        assert!(require_code(EntityKind::Sku, &code).is_ok());
        let too_long: String = "é".repeat(MAX_CODE_LEN + 1);
        assert!(require_code(EntityKind::Sku, &too_long).is_err());
    }
}
