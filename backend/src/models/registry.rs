//! Protocol registry
//!
//! Global protocol configuration: administrator, treasury, protocol fee and
//! default penalty. Created once at bootstrap and passed by reference into
//! every engine call that needs it; the engine never owns it.

use crate::constants::{BPS_DIVISOR, DEFAULT_PENALTY_BPS, MAX_PROTOCOL_FEE_BPS};
use crate::error::EngineError;
use serde::{Deserialize, Serialize};

/// Global protocol settings
///
/// # Example
/// ```
/// use rosca_core_rs::ProtocolRegistry;
///
/// let registry = ProtocolRegistry::initialize("admin", "treasury", 100).unwrap();
/// assert_eq!(registry.fee_bps(), 100);
/// assert!(ProtocolRegistry::initialize("admin", "treasury", 5_000).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolRegistry {
    admin: String,
    treasury: String,
    fee_bps: u16,
    /// Charged on collateral drawn to cover a missed contribution
    penalty_bps: u16,
}

impl ProtocolRegistry {
    pub fn initialize(admin: &str, treasury: &str, fee_bps: u16) -> Result<Self, EngineError> {
        validate_fee(fee_bps)?;
        Ok(Self {
            admin: admin.to_string(),
            treasury: treasury.to_string(),
            fee_bps,
            penalty_bps: DEFAULT_PENALTY_BPS,
        })
    }

    /// Rebuild a registry whose settings were changed after bootstrap
    pub fn from_parts(
        admin: &str,
        treasury: &str,
        fee_bps: u16,
        penalty_bps: u16,
    ) -> Result<Self, EngineError> {
        let registry = Self {
            penalty_bps,
            ..Self::initialize(admin, treasury, fee_bps)?
        };
        registry.validate()?;
        Ok(registry)
    }

    pub fn admin(&self) -> &str {
        &self.admin
    }

    pub fn treasury(&self) -> &str {
        &self.treasury
    }

    pub fn fee_bps(&self) -> u16 {
        self.fee_bps
    }

    pub fn penalty_bps(&self) -> u16 {
        self.penalty_bps
    }

    pub fn is_admin(&self, caller: &str) -> bool {
        self.admin == caller
    }

    pub fn update_fee(&mut self, caller: &str, fee_bps: u16) -> Result<(), EngineError> {
        self.require_admin(caller)?;
        validate_fee(fee_bps)?;
        self.fee_bps = fee_bps;
        Ok(())
    }

    pub fn update_treasury(&mut self, caller: &str, treasury: &str) -> Result<(), EngineError> {
        self.require_admin(caller)?;
        self.treasury = treasury.to_string();
        Ok(())
    }

    pub fn update_penalty(&mut self, caller: &str, penalty_bps: u16) -> Result<(), EngineError> {
        self.require_admin(caller)?;
        if i64::from(penalty_bps) > BPS_DIVISOR {
            return Err(EngineError::PenaltyExceedsLimit { bps: penalty_bps });
        }
        self.penalty_bps = penalty_bps;
        Ok(())
    }

    pub(crate) fn require_admin(&self, caller: &str) -> Result<(), EngineError> {
        if self.is_admin(caller) {
            Ok(())
        } else {
            Err(EngineError::NotRegistryAdmin)
        }
    }

    /// Re-check invariants on a registry that did not come from `initialize`
    pub fn validate(&self) -> Result<(), EngineError> {
        validate_fee(self.fee_bps)?;
        if i64::from(self.penalty_bps) > BPS_DIVISOR {
            return Err(EngineError::PenaltyExceedsLimit {
                bps: self.penalty_bps,
            });
        }
        Ok(())
    }
}

fn validate_fee(fee_bps: u16) -> Result<(), EngineError> {
    if fee_bps > MAX_PROTOCOL_FEE_BPS {
        return Err(EngineError::ProtocolFeeExceedsLimit {
            bps: fee_bps,
            max: MAX_PROTOCOL_FEE_BPS,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_at_limit_is_accepted() {
        assert!(ProtocolRegistry::initialize("admin", "treasury", MAX_PROTOCOL_FEE_BPS).is_ok());
    }

    #[test]
    fn test_only_admin_updates() {
        let mut registry = ProtocolRegistry::initialize("admin", "treasury", 100).unwrap();
        assert_eq!(registry.update_fee("mallory", 0), Err(EngineError::NotRegistryAdmin));
        assert_eq!(
            registry.update_treasury("mallory", "mallory"),
            Err(EngineError::NotRegistryAdmin)
        );

        registry.update_fee("admin", 250).unwrap();
        registry.update_treasury("admin", "vault-2").unwrap();
        assert_eq!(registry.fee_bps(), 250);
        assert_eq!(registry.treasury(), "vault-2");
    }

    #[test]
    fn test_update_rejects_excessive_fee_without_change() {
        let mut registry = ProtocolRegistry::initialize("admin", "treasury", 100).unwrap();
        assert!(matches!(
            registry.update_fee("admin", 1_001),
            Err(EngineError::ProtocolFeeExceedsLimit { .. })
        ));
        assert_eq!(registry.fee_bps(), 100);
    }

    #[test]
    fn test_penalty_bounds() {
        let mut registry = ProtocolRegistry::initialize("admin", "treasury", 100).unwrap();
        assert_eq!(registry.penalty_bps(), DEFAULT_PENALTY_BPS);
        assert_eq!(
            registry.update_penalty("admin", 10_001),
            Err(EngineError::PenaltyExceedsLimit { bps: 10_001 })
        );
        registry.update_penalty("admin", 0).unwrap();
        assert_eq!(registry.penalty_bps(), 0);
    }

    #[test]
    fn test_from_parts_keeps_penalty() {
        let mut updated = ProtocolRegistry::initialize("admin", "treasury", 100).unwrap();
        updated.update_penalty("admin", 1_200).unwrap();

        let rebuilt = ProtocolRegistry::from_parts("admin", "treasury", 100, 1_200).unwrap();
        assert_eq!(rebuilt, updated);
        assert_eq!(
            ProtocolRegistry::from_parts("admin", "treasury", 100, 10_001),
            Err(EngineError::PenaltyExceedsLimit { bps: 10_001 })
        );
    }
}
