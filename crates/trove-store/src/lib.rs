//! trove-store crate

pub mod store;

pub use store::{
    BridgeAssetRow, DailyMetricRow, GaugeRow, GaugeStateRow, LiquidationRow, RedemptionRow,
    SnapshotRow, Store, StoreCounts, TroveRow,
};
