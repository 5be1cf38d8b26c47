pub mod device;
pub mod error;
pub mod event;
pub mod reconciler;
pub mod repository;
pub mod service;
pub mod telemetry;

pub use device::{Device, ResolvedDevice, UpsertDeviceInput};
pub use error::{DomainError, DomainResult};
pub use event::{decode_batch, DecodeError, TagEvent};
pub use reconciler::{reconcile, DerivedTimestampPolicy, ReconcilePlan};
pub use repository::{DeviceRepository, TelemetryRepository};
pub use service::TagEventService;
pub use telemetry::{names, TelemetryValue, TelemetryWrite};

/// Name of the profile (and its device type) attached to devices created on
/// first sight of an unknown tag serial.
pub const DEFAULT_PROFILE_NAME: &str = "rtls-tag";
