use async_trait::async_trait;

use crate::device::{ResolvedDevice, UpsertDeviceInput};
use crate::telemetry::TelemetryWrite;

/// Resolve-or-create of devices keyed by external serial.
/// Infrastructure layer (rtls-postgres) implements this trait.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceRepository: Send + Sync {
    /// Returns the device for `input.serial`, creating it on first sight
    /// with the default profile and the seeded attribute set. Concurrent
    /// creations for the same serial must resolve to the single surviving
    /// device row.
    async fn upsert_device(&self, input: UpsertDeviceInput) -> anyhow::Result<ResolvedDevice>;
}

/// Whole-value upserts against the (device, name) last-value table.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TelemetryRepository: Send + Sync {
    /// Creates or replaces one attribute value. Replacement is whole-value;
    /// the store never merges inside a value.
    async fn upsert_telemetry(&self, device_id: i64, write: TelemetryWrite) -> anyhow::Result<()>;
}
