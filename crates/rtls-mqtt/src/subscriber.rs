use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use rtls_domain::{decode_batch, TagEventService};

use crate::worker::IngestWorkerConfig;

/// Run the MQTT subscriber loop with bounded reconnect retries.
pub(crate) async fn run_mqtt_subscriber(
    config: IngestWorkerConfig,
    shutdown_token: CancellationToken,
    service: Arc<TagEventService>,
) {
    let limiter = Arc::new(Semaphore::new(config.max_in_flight_events));
    let mut retry_count = 0;

    loop {
        if shutdown_token.is_cancelled() {
            debug!("subscriber cancelled before connection");
            break;
        }

        match run_mqtt_connection(
            &config,
            &shutdown_token,
            Arc::clone(&service),
            Arc::clone(&limiter),
        )
        .await
        {
            Ok(()) => {
                debug!("subscriber stopped cleanly");
                break;
            }
            Err(e) => {
                error!(error = %e, "MQTT connection error");

                retry_count += 1;
                if retry_count >= config.max_retry_attempts {
                    error!(
                        max_retries = config.max_retry_attempts,
                        "max retry attempts reached, stopping subscriber"
                    );
                    break;
                }

                warn!(
                    attempt = retry_count,
                    max_attempts = config.max_retry_attempts,
                    "retrying MQTT connection"
                );

                tokio::select! {
                    _ = shutdown_token.cancelled() => break,
                    _ = tokio::time::sleep(config.retry_delay()) => {}
                }
            }
        }
    }

    info!("ingest subscriber stopped");
}

/// Run a single MQTT connection session
async fn run_mqtt_connection(
    config: &IngestWorkerConfig,
    shutdown_token: &CancellationToken,
    service: Arc<TagEventService>,
    limiter: Arc<Semaphore>,
) -> anyhow::Result<()> {
    let (host, port) = parse_broker_url(&config.broker_url)?;

    let mut mqtt_options = MqttOptions::new(&config.client_id, host, port);
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    mqtt_options.set_clean_session(true);

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 100);

    client
        .subscribe(&config.topic, QoS::AtLeastOnce)
        .await
        .map_err(|e| anyhow!("failed to subscribe: {}", e))?;

    info!(topic = %config.topic, "subscribed to MQTT topic");

    loop {
        tokio::select! {
            _ = shutdown_token.cancelled() => {
                debug!("shutdown signal received");
                let _ = client.disconnect().await;
                return Ok(());
            }
            event = eventloop.poll() => {
                match event {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        handle_batch(
                            &publish.topic,
                            &publish.payload,
                            Arc::clone(&service),
                            Arc::clone(&limiter),
                        )
                        .await;
                    }
                    Ok(Event::Incoming(Packet::SubAck(_))) => {
                        debug!("subscription acknowledged");
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("connected to MQTT broker");
                    }
                    Ok(Event::Incoming(Packet::PingResp)) => {
                        // Ping response - connection is healthy
                    }
                    Ok(_) => {
                        // Other events (outgoing, etc.)
                    }
                    Err(e) => {
                        return Err(anyhow!("MQTT event loop error: {}", e));
                    }
                }
            }
        }
    }
}

/// Handle one transport batch.
///
/// Decodes the payload and dispatches every event as its own task without
/// awaiting completion, so the transport callback is never blocked on store
/// latency. The semaphore bounds in-flight events; completion order across
/// events is not preserved, including events for the same device.
///
/// Each batch gets a new independent root trace, not nested under the
/// connection span.
pub(crate) async fn handle_batch(
    topic: &str,
    payload: &[u8],
    service: Arc<TagEventService>,
    limiter: Arc<Semaphore>,
) {
    let span = info_span!(
        parent: Span::none(),
        "mqtt_batch",
        topic = %topic,
        payload_size = payload.len(),
        event_count = tracing::field::Empty,
    );

    async {
        let events = match decode_batch(payload) {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, "dropping malformed batch");
                return;
            }
        };

        Span::current().record("event_count", events.len());

        for event in events {
            let permit = match Arc::clone(&limiter).acquire_owned().await {
                Ok(permit) => permit,
                // The semaphore is never closed while the worker runs.
                Err(_) => return,
            };
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                let _permit = permit;
                let tag_id = event.tag_id.clone();
                if let Err(e) = service.process_event(event).await {
                    error!(tag_id = %tag_id, error = %e, "failed to reconcile tag event");
                }
            });
        }
    }
    .instrument(span)
    .await
}

/// Parse broker URL in format mqtt://host:port or tcp://host:port or host:port
fn parse_broker_url(url: &str) -> anyhow::Result<(&str, u16)> {
    let url = url.trim_start_matches("mqtt://");
    let url = url.trim_start_matches("tcp://");

    let parts: Vec<&str> = url.split(':').collect();
    match parts.len() {
        1 => Ok((parts[0], 1883)), // Default MQTT port
        2 => {
            let port = parts[1]
                .parse::<u16>()
                .map_err(|_| anyhow!("invalid port in broker URL: {}", parts[1]))?;
            Ok((parts[0], port))
        }
        _ => Err(anyhow!("invalid broker URL format: {}", url)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtls_domain::DerivedTimestampPolicy;

    mod fakes {
        use std::collections::HashMap;
        use std::sync::atomic::{AtomicI64, Ordering};
        use std::sync::{Arc, Mutex};

        use async_trait::async_trait;

        use rtls_domain::{
            Device, DeviceRepository, ResolvedDevice, TelemetryRepository, TelemetryWrite,
            UpsertDeviceInput,
        };

        /// In-memory device store keyed by serial.
        pub struct InMemoryDeviceRepository {
            devices: Mutex<HashMap<String, Device>>,
            next_id: AtomicI64,
        }

        impl InMemoryDeviceRepository {
            pub fn new() -> Self {
                Self {
                    devices: Mutex::new(HashMap::new()),
                    next_id: AtomicI64::new(1),
                }
            }

            pub fn device_count(&self) -> usize {
                self.devices.lock().unwrap().len()
            }

            pub fn device_id(&self, serial: &str) -> Option<i64> {
                self.devices.lock().unwrap().get(serial).map(|d| d.id)
            }
        }

        #[async_trait]
        impl DeviceRepository for InMemoryDeviceRepository {
            async fn upsert_device(
                &self,
                input: UpsertDeviceInput,
            ) -> anyhow::Result<ResolvedDevice> {
                let mut devices = self.devices.lock().unwrap();
                if let Some(device) = devices.get(&input.serial) {
                    return Ok(ResolvedDevice {
                        device: device.clone(),
                        created: false,
                    });
                }
                let device = Device {
                    id: self.next_id.fetch_add(1, Ordering::SeqCst),
                    serial: input.serial.clone(),
                    name: input.serial.clone(),
                };
                devices.insert(input.serial, device.clone());
                Ok(ResolvedDevice {
                    device,
                    created: true,
                })
            }
        }

        /// In-memory last-value table keyed by (device, name).
        pub struct InMemoryTelemetryRepository {
            values: Mutex<HashMap<(i64, &'static str), serde_json::Value>>,
        }

        impl InMemoryTelemetryRepository {
            pub fn new() -> Self {
                Self {
                    values: Mutex::new(HashMap::new()),
                }
            }

            pub fn value(&self, device_id: i64, name: &'static str) -> Option<serde_json::Value> {
                self.values.lock().unwrap().get(&(device_id, name)).cloned()
            }

            pub fn write_count(&self) -> usize {
                self.values.lock().unwrap().len()
            }
        }

        #[async_trait]
        impl TelemetryRepository for InMemoryTelemetryRepository {
            async fn upsert_telemetry(
                &self,
                device_id: i64,
                write: TelemetryWrite,
            ) -> anyhow::Result<()> {
                self.values
                    .lock()
                    .unwrap()
                    .insert((device_id, write.name), write.value.to_json());
                Ok(())
            }
        }

        pub fn service_with_fakes() -> (
            Arc<InMemoryDeviceRepository>,
            Arc<InMemoryTelemetryRepository>,
        ) {
            (
                Arc::new(InMemoryDeviceRepository::new()),
                Arc::new(InMemoryTelemetryRepository::new()),
            )
        }
    }

    use fakes::service_with_fakes;
    use rtls_domain::{names, TagEventService};

    const MAX_IN_FLIGHT: usize = 4;

    /// Waits for every spawned event task to finish by draining the permit
    /// pool the dispatcher hands out.
    async fn drain(limiter: &Arc<Semaphore>) {
        let _all = limiter
            .acquire_many(MAX_IN_FLIGHT as u32)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn dispatches_every_event_of_a_batch() {
        let (devices, telemetry) = service_with_fakes();
        let service = Arc::new(TagEventService::new(
            devices.clone(),
            telemetry.clone(),
            DerivedTimestampPolicy::PerFlag,
        ));
        let limiter = Arc::new(Semaphore::new(MAX_IN_FLIGHT));

        let payload = br#"[
            {"tagId":"T1","anchor":"A1","inLine":true,"inPoste":false,"isStrange":false},
            {"tagId":"T2","anchor":"A2","inLine":false,"inPoste":true,"isStrange":false}
        ]"#;

        handle_batch("rtls/events", payload, service, Arc::clone(&limiter)).await;
        drain(&limiter).await;

        assert_eq!(devices.device_count(), 2);
        let t1 = devices.device_id("T1").unwrap();
        let t2 = devices.device_id("T2").unwrap();
        assert!(telemetry.value(t1, names::LAST_SEEN).is_some());
        assert!(telemetry.value(t2, names::LAST_IN_POSTE).is_some());
        assert!(telemetry.value(t2, names::LAST_SEEN).is_some());
    }

    #[tokio::test]
    async fn malformed_batch_is_dropped_without_dispatch() {
        let (devices, telemetry) = service_with_fakes();
        let service = Arc::new(TagEventService::new(
            devices.clone(),
            telemetry.clone(),
            DerivedTimestampPolicy::PerFlag,
        ));
        let limiter = Arc::new(Semaphore::new(MAX_IN_FLIGHT));

        handle_batch("rtls/events", b"not json at all", service, Arc::clone(&limiter)).await;
        drain(&limiter).await;

        assert_eq!(devices.device_count(), 0);
        assert_eq!(telemetry.write_count(), 0);
    }

    #[tokio::test]
    async fn next_batch_processes_after_a_malformed_one() {
        let (devices, telemetry) = service_with_fakes();
        let service = Arc::new(TagEventService::new(
            devices.clone(),
            telemetry.clone(),
            DerivedTimestampPolicy::PerFlag,
        ));
        let limiter = Arc::new(Semaphore::new(MAX_IN_FLIGHT));

        handle_batch(
            "rtls/events",
            br#"[{"tagId":"T1""#,
            Arc::clone(&service),
            Arc::clone(&limiter),
        )
        .await;

        let payload =
            br#"[{"tagId":"T1","anchor":"A1","inLine":true,"inPoste":false,"isStrange":false}]"#;
        handle_batch("rtls/events", payload, service, Arc::clone(&limiter)).await;
        drain(&limiter).await;

        let t1 = devices.device_id("T1").unwrap();
        assert_eq!(devices.device_count(), 1);
        assert!(telemetry.value(t1, names::LAST_SEEN).is_some());
    }

    #[tokio::test]
    async fn duplicate_serials_in_one_batch_resolve_to_one_device() {
        let (devices, telemetry) = service_with_fakes();
        let service = Arc::new(TagEventService::new(
            devices.clone(),
            telemetry.clone(),
            DerivedTimestampPolicy::PerFlag,
        ));
        let limiter = Arc::new(Semaphore::new(MAX_IN_FLIGHT));

        let payload = br#"[
            {"tagId":"T1","anchor":"A1","inLine":true,"inPoste":false,"isStrange":false},
            {"tagId":"T1","anchor":"A2","inLine":true,"inPoste":false,"isStrange":false}
        ]"#;

        handle_batch("rtls/events", payload, service, Arc::clone(&limiter)).await;
        drain(&limiter).await;

        assert_eq!(devices.device_count(), 1);
    }

    #[test]
    fn test_parse_broker_url_with_port() {
        let (host, port) = parse_broker_url("mqtt://localhost:1883").unwrap();
        assert_eq!(host, "localhost");
        assert_eq!(port, 1883);
    }

    #[test]
    fn test_parse_broker_url_without_scheme() {
        let (host, port) = parse_broker_url("broker.example.com:8883").unwrap();
        assert_eq!(host, "broker.example.com");
        assert_eq!(port, 8883);
    }

    #[test]
    fn test_parse_broker_url_default_port() {
        let (host, port) = parse_broker_url("mqtt://broker.local").unwrap();
        assert_eq!(host, "broker.local");
        assert_eq!(port, 1883);
    }

    #[test]
    fn test_parse_broker_url_tcp_scheme() {
        let (host, port) = parse_broker_url("tcp://mqtt.example.com:1883").unwrap();
        assert_eq!(host, "mqtt.example.com");
        assert_eq!(port, 1883);
    }

    #[test]
    fn test_parse_broker_url_rejects_garbage() {
        assert!(parse_broker_url("mqtt://host:port:extra").is_err());
        assert!(parse_broker_url("mqtt://host:notaport").is_err());
    }
}
