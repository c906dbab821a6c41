//! Domain models.

pub mod adjustment;
pub mod outlet_stock;

pub use adjustment::{
    AdjustmentFilter, AdjustmentLine, AdjustmentStatus, InventoryAdjustment, NewAdjustment,
    SyncFailure, UpsertOutcome,
};
pub use outlet_stock::{AppliedLine, OutletStockItem, StockDelta, StockFilter, UpsertStockInput};
