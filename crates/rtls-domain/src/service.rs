use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info};

use crate::device::UpsertDeviceInput;
use crate::error::{DomainError, DomainResult};
use crate::event::TagEvent;
use crate::reconciler::{reconcile, DerivedTimestampPolicy};
use crate::repository::{DeviceRepository, TelemetryRepository};
use crate::telemetry::TelemetryWrite;

/// Domain service reconciling one tag event into the last-known state store.
///
/// Flow:
/// 1. Compute the write plan from the event's flags
/// 2. Resolve the device (created on first sight, seeding the plain set)
/// 3. Overwrite the plain attributes of an already-known device
/// 4. Advance the qualifying derived timestamps
///
/// A resolution failure drops the event with no writes performed. A failed
/// attribute or timestamp upsert is logged and does not abort the sibling
/// writes of the same event.
pub struct TagEventService {
    device_repository: Arc<dyn DeviceRepository>,
    telemetry_repository: Arc<dyn TelemetryRepository>,
    policy: DerivedTimestampPolicy,
}

impl TagEventService {
    pub fn new(
        device_repository: Arc<dyn DeviceRepository>,
        telemetry_repository: Arc<dyn TelemetryRepository>,
        policy: DerivedTimestampPolicy,
    ) -> Self {
        Self {
            device_repository,
            telemetry_repository,
            policy,
        }
    }

    pub async fn process_event(&self, event: TagEvent) -> DomainResult<()> {
        if event.tag_id.is_empty() {
            return Err(DomainError::InvalidEvent("empty tagId".to_string()));
        }

        let now = Utc::now();
        let plan = reconcile(&event, self.policy, now);

        let resolved = self
            .device_repository
            .upsert_device(UpsertDeviceInput {
                serial: event.tag_id.clone(),
                seed: plan.attributes.clone(),
            })
            .await
            .map_err(|source| DomainError::ResolutionError {
                serial: event.tag_id.clone(),
                source,
            })?;

        let device = resolved.device;
        if resolved.created {
            info!(
                device_id = device.id,
                serial = %device.serial,
                "created device on first sight"
            );
        } else {
            // The creation path seeds the plain set atomically with the
            // device row; only an already-known device needs the overwrite.
            for write in &plan.attributes {
                self.apply_write(device.id, write.clone()).await;
            }
        }

        for write in &plan.derived {
            self.apply_write(device.id, write.clone()).await;
        }

        debug!(
            device_id = device.id,
            serial = %device.serial,
            derived = plan.derived.len(),
            "reconciled tag event"
        );

        Ok(())
    }

    async fn apply_write(&self, device_id: i64, write: TelemetryWrite) {
        let name = write.name;
        if let Err(source) = self
            .telemetry_repository
            .upsert_telemetry(device_id, write)
            .await
        {
            let err = DomainError::WriteError {
                device_id,
                name,
                source,
            };
            error!(error = %err, "telemetry upsert failed");
        }
    }
}
