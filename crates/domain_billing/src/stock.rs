//! Inventory stock linkage
//!
//! Stock levels belong to the inventory module. The ledger only reserves
//! units when an invoice item is linked to a stock item and returns them
//! when that item shrinks, is re-linked or is deleted.

use serde::{Deserialize, Serialize};

use core_kernel::{InventoryItemId, SchoolId};

/// A stock item as seen by the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryStock {
    pub id: InventoryItemId,
    pub school_id: SchoolId,
    pub name: String,
    pub quantity_in_stock: u32,
}

impl InventoryStock {
    pub fn new(school_id: SchoolId, name: impl Into<String>, quantity_in_stock: u32) -> Self {
        Self {
            id: InventoryItemId::new_v7(),
            school_id,
            name: name.into(),
            quantity_in_stock,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockChange {
    /// Take units out of stock; must not go below zero
    Reserve(u32),
    /// Put units back into stock
    Release(u32),
}

/// One stock movement against a single inventory item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockAdjustment {
    pub inventory_item_id: InventoryItemId,
    pub change: StockChange,
}

impl StockAdjustment {
    pub fn reserve(inventory_item_id: InventoryItemId, quantity: u32) -> Self {
        Self { inventory_item_id, change: StockChange::Reserve(quantity) }
    }

    pub fn release(inventory_item_id: InventoryItemId, quantity: u32) -> Self {
        Self { inventory_item_id, change: StockChange::Release(quantity) }
    }
}

/// Stock movements needed to move an item's hold from `old` to `new`
///
/// Holds are `(inventory item, quantity)`. A re-link returns the whole old
/// quantity and reserves the whole new one; an unchanged link moves only the
/// difference. Releases are ordered before reserves.
pub fn reconcile(
    old: Option<(InventoryItemId, u32)>,
    new: Option<(InventoryItemId, u32)>,
) -> Vec<StockAdjustment> {
    match (old, new) {
        (Some((old_id, old_qty)), Some((new_id, new_qty))) if old_id == new_id => {
            if new_qty > old_qty {
                vec![StockAdjustment::reserve(new_id, new_qty - old_qty)]
            } else if new_qty < old_qty {
                vec![StockAdjustment::release(old_id, old_qty - new_qty)]
            } else {
                Vec::new()
            }
        }
        (old, new) => {
            let mut adjustments = Vec::with_capacity(2);
            if let Some((id, qty)) = old {
                adjustments.push(StockAdjustment::release(id, qty));
            }
            if let Some((id, qty)) = new {
                adjustments.push(StockAdjustment::reserve(id, qty));
            }
            adjustments
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_link_moves_difference() {
        let id = InventoryItemId::new();
        assert_eq!(reconcile(Some((id, 2)), Some((id, 6))), vec![StockAdjustment::reserve(id, 4)]);
        assert_eq!(reconcile(Some((id, 6)), Some((id, 2))), vec![StockAdjustment::release(id, 4)]);
        assert!(reconcile(Some((id, 3)), Some((id, 3))).is_empty());
    }

    #[test]
    fn test_relink_returns_old_and_reserves_new() {
        let a = InventoryItemId::new();
        let b = InventoryItemId::new();
        assert_eq!(
            reconcile(Some((a, 2)), Some((b, 3))),
            vec![StockAdjustment::release(a, 2), StockAdjustment::reserve(b, 3)]
        );
    }

    #[test]
    fn test_link_and_unlink() {
        let a = InventoryItemId::new();
        assert_eq!(reconcile(None, Some((a, 1))), vec![StockAdjustment::reserve(a, 1)]);
        assert_eq!(reconcile(Some((a, 5)), None), vec![StockAdjustment::release(a, 5)]);
        assert!(reconcile(None, None).is_empty());
    }
}
