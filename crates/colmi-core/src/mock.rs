//! Scriptable in-memory transport for tests and demos.
//!
//! [`MockTransport`] emulates a ring behind the [`Transport`] trait:
//! scripted peripherals appear when scanning starts, connection and
//! discovery succeed (or fail, when scripted to), and writes to the
//! UART RX characteristic are answered with well-formed response frames
//! on the TX characteristic. Test-control methods configure the
//! scripted behavior and inspect what the driver wrote.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use colmi_types::PeripheralHandle;

use crate::commands::{CMD_ACTIVITY, CMD_BATTERY};
use crate::error::Result;
use crate::frame::{FRAME_LEN, checksum};
use crate::transport::{
    CharacteristicInfo, Transport, TransportEvent, TransportEventSender, TransportEvents,
    event_channel,
};
use crate::uuids;

/// Scripted activity numbers for one day on the emulated ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockDay {
    /// Step count.
    pub steps: u16,
    /// Calories burned (kcal).
    pub calories: u16,
    /// Distance in meters.
    pub distance_meters: u16,
}

#[derive(Debug)]
struct MockState {
    peripherals: Vec<PeripheralHandle>,
    scanning: bool,
    connect_failure: Option<String>,
    services: Vec<Uuid>,
    characteristics: Vec<CharacteristicInfo>,
    battery_percent: u8,
    days: HashMap<u8, MockDay>,
    drop_responses: usize,
    written: Vec<Vec<u8>>,
}

/// In-memory [`Transport`] emulating a ring peripheral.
#[derive(Debug, Clone)]
pub struct MockTransport {
    events: TransportEventSender,
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create a mock transport and the event stream the driver consumes.
    ///
    /// Starts with no scripted peripherals, a UART service with properly
    /// flagged RX/TX characteristics, and a 72% battery.
    #[must_use]
    pub fn new() -> (Self, TransportEvents) {
        let (events, receiver) = event_channel();
        let transport = Self {
            events,
            state: Arc::new(Mutex::new(MockState {
                peripherals: Vec::new(),
                scanning: false,
                connect_failure: None,
                services: vec![uuids::UART_SERVICE],
                characteristics: vec![
                    CharacteristicInfo::new(uuids::UART_RX, true, false),
                    CharacteristicInfo::new(uuids::UART_TX, false, true),
                ],
                battery_percent: 72,
                days: HashMap::new(),
                drop_responses: 0,
                written: Vec::new(),
            })),
        };
        (transport, receiver)
    }

    /// Script a peripheral to appear when scanning starts.
    pub async fn add_peripheral(&self, name: Option<&str>) -> PeripheralHandle {
        let suffix: u32 = rand::rng().random_range(0..100_000);
        let handle = PeripheralHandle::new(
            format!("MOCK-{suffix:05}"),
            name.map(str::to_string),
        );
        let mut state = self.state.lock().await;
        state.peripherals.push(handle.clone());
        if state.scanning {
            self.emit(TransportEvent::PeripheralDiscovered(handle.clone()))
                .await;
        }
        handle
    }

    /// Script the next connection attempt to fail with this reason.
    pub async fn fail_next_connect(&self, reason: &str) {
        self.state.lock().await.connect_failure = Some(reason.to_string());
    }

    /// Replace the services reported by discovery.
    pub async fn set_services(&self, services: Vec<Uuid>) {
        self.state.lock().await.services = services;
    }

    /// Replace the characteristics reported by discovery.
    pub async fn set_characteristics(&self, characteristics: Vec<CharacteristicInfo>) {
        self.state.lock().await.characteristics = characteristics;
    }

    /// Set the battery percentage reported to battery queries.
    pub async fn set_battery(&self, percent: u8) {
        self.state.lock().await.battery_percent = percent;
    }

    /// Script the activity numbers for a day offset.
    pub async fn set_day(&self, day_offset: u8, day: MockDay) {
        self.state.lock().await.days.insert(day_offset, day);
    }

    /// Swallow the next `count` responses, emulating lost notifications.
    pub async fn drop_responses(&self, count: usize) {
        self.state.lock().await.drop_responses = count;
    }

    /// Frames the driver has written, oldest first.
    pub async fn written(&self) -> Vec<Vec<u8>> {
        self.state.lock().await.written.clone()
    }

    /// Inject a raw notification payload on a characteristic.
    pub async fn inject_notification(&self, characteristic: Uuid, value: Vec<u8>) {
        self.emit(TransportEvent::ValueUpdated {
            characteristic,
            value,
        })
        .await;
    }

    /// Emulate the peripheral dropping the link.
    pub async fn drop_link(&self) {
        self.emit(TransportEvent::Disconnected).await;
    }

    async fn emit(&self, event: TransportEvent) {
        // A closed channel means the driver is gone; nothing to report to.
        let _ = self.events.send(event).await;
    }

    fn response_for(state: &MockState, frame: &[u8]) -> Option<[u8; FRAME_LEN]> {
        let mut response = [0u8; FRAME_LEN];
        match frame.first() {
            Some(&CMD_BATTERY) => {
                response[0] = CMD_BATTERY;
                response[1] = state.battery_percent;
            }
            Some(&CMD_ACTIVITY) => {
                let day_offset = frame.get(1).copied().unwrap_or(0);
                let day = state.days.get(&day_offset).copied().unwrap_or(MockDay {
                    steps: 0,
                    calories: 0,
                    distance_meters: 0,
                });
                response[0] = CMD_ACTIVITY;
                response[7..9].copy_from_slice(&day.calories.to_le_bytes());
                response[9..11].copy_from_slice(&day.steps.to_le_bytes());
                response[11..13].copy_from_slice(&day.distance_meters.to_le_bytes());
            }
            _ => return None,
        }
        response[FRAME_LEN - 1] = checksum(&response);
        Some(response)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn start_scan(&self) -> Result<()> {
        let peripherals = {
            let mut state = self.state.lock().await;
            state.scanning = true;
            state.peripherals.clone()
        };
        for handle in peripherals {
            self.emit(TransportEvent::PeripheralDiscovered(handle)).await;
        }
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.state.lock().await.scanning = false;
        Ok(())
    }

    async fn connect(&self, peripheral_id: &str) -> Result<()> {
        debug!(peripheral_id, "mock connect");
        let failure = self.state.lock().await.connect_failure.take();
        match failure {
            Some(reason) => self.emit(TransportEvent::ConnectFailed { reason }).await,
            None => self.emit(TransportEvent::Connected).await,
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.emit(TransportEvent::Disconnected).await;
        Ok(())
    }

    async fn discover_services(&self) -> Result<()> {
        let services = self.state.lock().await.services.clone();
        self.emit(TransportEvent::ServicesDiscovered(services)).await;
        Ok(())
    }

    async fn discover_characteristics(&self, _service: Uuid) -> Result<()> {
        let characteristics = self.state.lock().await.characteristics.clone();
        self.emit(TransportEvent::CharacteristicsDiscovered(characteristics))
            .await;
        Ok(())
    }

    async fn subscribe(&self, _characteristic: Uuid) -> Result<()> {
        Ok(())
    }

    async fn write(&self, _characteristic: Uuid, payload: &[u8]) -> Result<()> {
        let response = {
            let mut state = self.state.lock().await;
            state.written.push(payload.to_vec());
            if state.drop_responses > 0 {
                state.drop_responses -= 1;
                None
            } else {
                Self::response_for(&state, payload)
            }
        };
        if let Some(response) = response {
            self.emit(TransportEvent::ValueUpdated {
                characteristic: uuids::UART_TX,
                value: response.to_vec(),
            })
            .await;
        }
        Ok(())
    }
}
