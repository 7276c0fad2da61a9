// MQTT transport
// ESP-IDF MQTT client plus a receiver thread that pumps its connection.
// The thread only updates the client's shared state and queues deliveries;
// the control loop picks them up through `poll`.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Result};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embedded_svc::mqtt::client::{Details, EventPayload, QoS};
use esp_idf_svc::mqtt::client::{EspMqttClient, EspMqttConnection, MqttClientConfiguration};
use log::{debug, info, warn};

use crate::hal::{BrokerSession, BrokerTransport, InboundMessage};

const INBOUND_QUEUE_SIZE: usize = 8;
const RECEIVER_STACK_SIZE: usize = 6 * 1024;

/// State owned by one client and its receiver thread. A dropped client's
/// thread can only touch its own copy.
struct ClientShared {
    connected: AtomicBool,
    inbound: Channel<CriticalSectionRawMutex, InboundMessage, INBOUND_QUEUE_SIZE>,
}

struct ActiveClient {
    client: EspMqttClient<'static>,
    shared: Arc<ClientShared>,
}

#[derive(Default)]
pub struct EspMqttTransport {
    active: Option<ActiveClient>,
    // Bumped on every CONNACK, including the client's own reconnects
    sessions: Arc<AtomicU32>,
}

impl EspMqttTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn spawn_receiver(
        mut connection: EspMqttConnection,
        shared: Arc<ClientShared>,
        sessions: Arc<AtomicU32>,
    ) -> Result<()> {
        thread::Builder::new()
            .name("mqtt-rx".into())
            .stack_size(RECEIVER_STACK_SIZE)
            .spawn(move || {
                // Ends when the client is dropped and the connection closes
                while let Ok(event) = connection.next() {
                    match event.payload() {
                        EventPayload::Connected(_) => {
                            info!("✅ Broker session established");
                            sessions.fetch_add(1, Ordering::AcqRel);
                            shared.connected.store(true, Ordering::Release);
                        }
                        EventPayload::Disconnected => {
                            warn!("🔌 Broker session lost");
                            shared.connected.store(false, Ordering::Release);
                        }
                        EventPayload::Received {
                            topic: Some(topic),
                            data,
                            details: Details::Complete,
                            ..
                        } => {
                            let message = InboundMessage {
                                topic: topic.to_string(),
                                payload: data.to_vec(),
                            };
                            if shared.inbound.try_send(message).is_err() {
                                warn!("⚠️ Inbound queue full - delivery on '{}' dropped", topic);
                            }
                        }
                        EventPayload::Received { .. } => {
                            warn!("⚠️ Fragmented delivery ignored");
                        }
                        _ => {}
                    }
                }
                shared.connected.store(false, Ordering::Release);
                debug!("MQTT receiver thread finished");
            })?;
        Ok(())
    }

    fn client(&mut self) -> Result<&mut EspMqttClient<'static>> {
        self.active
            .as_mut()
            .map(|active| &mut active.client)
            .ok_or_else(|| anyhow!("no broker client"))
    }
}

impl BrokerTransport for EspMqttTransport {
    fn connect(&mut self, session: &BrokerSession<'_>) -> Result<()> {
        if self.active.is_some() {
            // The client keeps retrying by itself; only the CONNACK counts
            return if self.is_connected() {
                Ok(())
            } else {
                Err(anyhow!("awaiting broker acknowledgement"))
            };
        }

        let url = format!("mqtt://{}:{}", session.host, session.port);
        let conf = MqttClientConfiguration {
            client_id: Some(session.client_id),
            username: (!session.user.is_empty()).then_some(session.user),
            password: (!session.password.is_empty()).then_some(session.password),
            ..Default::default()
        };

        info!("🌐 MQTT broker URL: {}", url);
        let (client, connection) = EspMqttClient::new(&url, &conf)?;
        let shared = Arc::new(ClientShared {
            connected: AtomicBool::new(false),
            inbound: Channel::new(),
        });
        Self::spawn_receiver(connection, shared.clone(), self.sessions.clone())?;
        self.active = Some(ActiveClient { client, shared });

        if self.is_connected() {
            Ok(())
        } else {
            Err(anyhow!("connection to {} in progress", url))
        }
    }

    fn is_connected(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.shared.connected.load(Ordering::Acquire))
    }

    fn session_generation(&self) -> u32 {
        self.sessions.load(Ordering::Acquire)
    }

    fn subscribe(&mut self, topic: &str) -> Result<()> {
        self.client()?.subscribe(topic, QoS::AtMostOnce)?;
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<()> {
        self.client()?.publish(topic, QoS::AtMostOnce, false, payload)?;
        Ok(())
    }

    fn disconnect(&mut self) {
        // Queued deliveries go with the client
        if self.active.take().is_some() {
            info!("🔌 Broker client dropped");
        }
    }

    fn poll(&mut self) -> Option<InboundMessage> {
        self.active.as_ref()?.shared.inbound.try_receive().ok()
    }
}
