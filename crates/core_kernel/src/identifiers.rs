//! Strongly-typed identifiers for ledger entities
//!
//! Newtype wrappers around UUIDs keep a student id from ever being passed
//! where an invoice id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates a new time-ordered identifier (v7)
            pub fn new_v7() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Returns the identifier prefix for display
            pub fn prefix() -> &'static str {
                $prefix
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid_str = s.strip_prefix(concat!($prefix, "-")).unwrap_or(s);
                Ok(Self(Uuid::parse_str(uuid_str)?))
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Uuid {
                id.0
            }
        }
    };
}

// Tenant and actors
define_id!(SchoolId, "SCH");
define_id!(UserId, "USR");

// Academic context (owned by the enrollment module)
define_id!(StudentId, "STU");
define_id!(AcademicYearId, "AY");
define_id!(ClassId, "CLS");
define_id!(SchoolLevelId, "LVL");

// Fee setup
define_id!(FeeStructureId, "FEE");
define_id!(FeeComponentId, "FEC");
define_id!(AssignmentId, "ASG");

// Invoicing
define_id!(InvoiceId, "INV");
define_id!(InvoiceItemId, "ITM");

// Inventory (owned by the inventory module)
define_id!(InventoryItemId, "STK");

// Collections
define_id!(PaymentId, "PAY");
define_id!(AllocationId, "ALC");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoice_id_display() {
        let id = InvoiceId::new();
        assert!(id.to_string().starts_with("INV-"));
    }

    #[test]
    fn test_id_parsing_with_and_without_prefix() {
        let original = StudentId::new();
        let parsed: StudentId = original.to_string().parse().unwrap();
        assert_eq!(original, parsed);

        let bare: StudentId = original.as_uuid().to_string().parse().unwrap();
        assert_eq!(original, bare);
    }

    #[test]
    fn test_uuid_conversion() {
        let uuid = Uuid::new_v4();
        let payment_id = PaymentId::from(uuid);
        let back: Uuid = payment_id.into();
        assert_eq!(uuid, back);
    }
}
