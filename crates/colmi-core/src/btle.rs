//! btleplug-backed transport.
//!
//! [`BtleTransport`] adapts the first system Bluetooth adapter to the
//! [`Transport`] trait. A pump task translates btleplug central events
//! into [`TransportEvent`]s; a second task, started on subscribe,
//! forwards characteristic notifications. Both tasks exit on their own
//! once the driver drops the event receiver.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CharPropFlags, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use colmi_types::PeripheralHandle;

use crate::error::{Error, Result};
use crate::transport::{
    CharacteristicInfo, Transport, TransportEvent, TransportEventSender, TransportEvents,
    event_channel,
};

#[derive(Debug, Default)]
struct BtleState {
    peripherals: HashMap<String, Peripheral>,
    connected: Option<Peripheral>,
}

/// [`Transport`] implementation over the system Bluetooth stack.
#[derive(Debug, Clone)]
pub struct BtleTransport {
    adapter: Adapter,
    events: TransportEventSender,
    state: Arc<Mutex<BtleState>>,
}

impl BtleTransport {
    /// Open the first available adapter and start the central event pump.
    ///
    /// Fails with [`Error::RadioUnavailable`] when the host has no usable
    /// Bluetooth adapter.
    pub async fn new() -> Result<(Self, TransportEvents)> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(Error::RadioUnavailable)?;

        let (events, receiver) = event_channel();
        let transport = Self {
            adapter,
            events,
            state: Arc::new(Mutex::new(BtleState::default())),
        };
        transport.spawn_event_pump().await?;
        Ok((transport, receiver))
    }

    async fn spawn_event_pump(&self) -> Result<()> {
        let mut central_events = self.adapter.events().await?;
        let adapter = self.adapter.clone();
        let state = Arc::clone(&self.state);
        let events = self.events.clone();

        tokio::spawn(async move {
            while let Some(event) = central_events.next().await {
                let forwarded = match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                        let Ok(peripheral) = adapter.peripheral(&id).await else {
                            continue;
                        };
                        let name = peripheral
                            .properties()
                            .await
                            .ok()
                            .flatten()
                            .and_then(|props| props.local_name);
                        let key = id.to_string();
                        state.lock().await.peripherals.insert(key.clone(), peripheral);
                        TransportEvent::PeripheralDiscovered(PeripheralHandle::new(key, name))
                    }
                    CentralEvent::DeviceConnected(_) => TransportEvent::Connected,
                    CentralEvent::DeviceDisconnected(_) => TransportEvent::Disconnected,
                    _ => continue,
                };
                if events.send(forwarded).await.is_err() {
                    break;
                }
            }
            debug!("central event pump stopped");
        });
        Ok(())
    }

    async fn connected(&self) -> Result<Peripheral> {
        self.state
            .lock()
            .await
            .connected
            .clone()
            .ok_or(Error::NotConnected)
    }
}

#[async_trait]
impl Transport for BtleTransport {
    async fn start_scan(&self) -> Result<()> {
        // Scan unfiltered: rings are matched by advertised name, and not
        // every unit carries its vendor service UUID in the advertisement.
        self.adapter.start_scan(ScanFilter::default()).await?;
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.adapter.stop_scan().await?;
        Ok(())
    }

    async fn connect(&self, peripheral_id: &str) -> Result<()> {
        let peripheral = self
            .state
            .lock()
            .await
            .peripherals
            .get(peripheral_id)
            .cloned()
            .ok_or_else(|| Error::connect_failed(format!("unknown peripheral {peripheral_id}")))?;

        self.state.lock().await.connected = Some(peripheral.clone());

        // Completion is reported by the central event pump; only local
        // initiation errors surface here as a ConnectFailed event.
        let events = self.events.clone();
        tokio::spawn(async move {
            if let Err(err) = peripheral.connect().await {
                warn!(%err, "connect initiation failed");
                let _ = events
                    .send(TransportEvent::ConnectFailed {
                        reason: err.to_string(),
                    })
                    .await;
            }
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let peripheral = self.state.lock().await.connected.take();
        if let Some(peripheral) = peripheral {
            peripheral.disconnect().await?;
        }
        Ok(())
    }

    async fn discover_services(&self) -> Result<()> {
        let peripheral = self.connected().await?;
        peripheral.discover_services().await?;
        let services: Vec<Uuid> = peripheral.services().iter().map(|s| s.uuid).collect();
        debug!(count = services.len(), "services discovered");
        let _ = self
            .events
            .send(TransportEvent::ServicesDiscovered(services))
            .await;
        Ok(())
    }

    async fn discover_characteristics(&self, service: Uuid) -> Result<()> {
        let peripheral = self.connected().await?;
        let characteristics: Vec<CharacteristicInfo> = peripheral
            .characteristics()
            .iter()
            .filter(|c| c.service_uuid == service)
            .map(|c| {
                CharacteristicInfo::new(
                    c.uuid,
                    c.properties
                        .intersects(CharPropFlags::WRITE | CharPropFlags::WRITE_WITHOUT_RESPONSE),
                    c.properties.contains(CharPropFlags::NOTIFY),
                )
            })
            .collect();
        debug!(%service, count = characteristics.len(), "characteristics discovered");
        let _ = self
            .events
            .send(TransportEvent::CharacteristicsDiscovered(characteristics))
            .await;
        Ok(())
    }

    async fn subscribe(&self, characteristic: Uuid) -> Result<()> {
        let peripheral = self.connected().await?;
        let target = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == characteristic)
            .ok_or_else(|| Error::characteristic_not_found(characteristic.to_string()))?;
        peripheral.subscribe(&target).await?;

        let mut notifications = peripheral.notifications().await?;
        let events = self.events.clone();
        tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                let forwarded = TransportEvent::ValueUpdated {
                    characteristic: notification.uuid,
                    value: notification.value,
                };
                if events.send(forwarded).await.is_err() {
                    break;
                }
            }
            debug!("notification pump stopped");
        });
        Ok(())
    }

    async fn write(&self, characteristic: Uuid, payload: &[u8]) -> Result<()> {
        let peripheral = self.connected().await?;
        let target = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == characteristic)
            .ok_or_else(|| Error::characteristic_not_found(characteristic.to_string()))?;
        peripheral
            .write(&target, payload, WriteType::WithResponse)
            .await?;
        Ok(())
    }
}
