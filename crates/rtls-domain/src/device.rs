use crate::telemetry::TelemetryWrite;

/// Internal device entity backing one physical tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: i64,
    pub serial: String,
    pub name: String,
}

/// Input for resolve-or-create of a device by its external serial.
///
/// `seed` is the initial attribute set written as part of the creation step
/// only; resolving an existing device leaves its attribute rows untouched.
#[derive(Debug, Clone)]
pub struct UpsertDeviceInput {
    pub serial: String,
    pub seed: Vec<TelemetryWrite>,
}

/// Result of device resolution. `created` is true when this call brought the
/// device row into existence (first sight of the serial).
#[derive(Debug, Clone)]
pub struct ResolvedDevice {
    pub device: Device,
    pub created: bool,
}
