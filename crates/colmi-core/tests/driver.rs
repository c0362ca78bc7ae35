//! End-to-end driver tests over the in-memory mock transport.

use std::time::Duration;

use colmi_core::mock::{MockDay, MockTransport};
use colmi_core::{
    ConnectionState, DriverConfig, DriverEvent, EventReceiver, RequestKind, RingDriver, uuids,
};

const TARGET: &str = "R02_5C07";

fn config() -> DriverConfig {
    DriverConfig::new(TARGET)
}

fn driver_over_mock(config: DriverConfig) -> (MockTransport, RingDriver, EventReceiver) {
    let (mock, transport_events) = MockTransport::new();
    let driver = RingDriver::new(mock.clone(), transport_events, config).unwrap();
    let events = driver.subscribe();
    (mock, driver, events)
}

/// Receive driver events until one matches, failing the test after 5s.
async fn wait_for(
    events: &mut EventReceiver,
    mut matches: impl FnMut(&DriverEvent) -> bool,
) -> DriverEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.expect("event stream closed");
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

async fn wait_for_ready(events: &mut EventReceiver) {
    wait_for(events, |e| {
        matches!(
            e,
            DriverEvent::StateChanged {
                state: ConnectionState::Ready
            }
        )
    })
    .await;
}

#[tokio::test]
async fn test_search_reaches_ready_and_reads_initial_state() {
    let (mock, driver, mut events) = driver_over_mock(config());
    mock.add_peripheral(Some(TARGET)).await;
    mock.set_battery(64).await;

    driver.search().await.unwrap();
    wait_for_ready(&mut events).await;

    // Battery and today's steps are fetched without being asked.
    wait_for(&mut events, |e| {
        matches!(e, DriverEvent::BatteryUpdated { percent: 64 })
    })
    .await;
    wait_for(&mut events, |e| {
        matches!(e, DriverEvent::DayResolved { sample } if sample.day_offset == 0)
    })
    .await;

    let snapshot = driver.snapshot().await;
    assert!(snapshot.connected);
    assert_eq!(snapshot.battery, 64);
    assert!(snapshot.today.is_some());
    assert_eq!(driver.state().await, ConnectionState::Ready);
    driver.shutdown().await;
}

#[tokio::test]
async fn test_fetch_battery_updates_snapshot_and_status() {
    let (mock, driver, mut events) = driver_over_mock(config());
    mock.add_peripheral(Some(TARGET)).await;
    driver.search().await.unwrap();
    wait_for_ready(&mut events).await;

    mock.set_battery(88).await;
    driver.fetch_battery().await.unwrap();
    wait_for(&mut events, |e| {
        matches!(e, DriverEvent::BatteryUpdated { percent: 88 })
    })
    .await;

    let snapshot = driver.snapshot().await;
    assert_eq!(snapshot.battery, 88);
    assert_eq!(snapshot.status, "Battery Level: 88%");
    driver.shutdown().await;
}

#[tokio::test]
async fn test_fetch_day_attributes_requested_offset() {
    let (mock, driver, mut events) = driver_over_mock(config());
    mock.add_peripheral(Some(TARGET)).await;
    mock.set_day(
        3,
        MockDay {
            steps: 4500,
            calories: 120,
            distance_meters: 3200,
        },
    )
    .await;
    driver.search().await.unwrap();
    wait_for_ready(&mut events).await;

    driver.fetch_day(3).await.unwrap();
    let event = wait_for(&mut events, |e| {
        matches!(e, DriverEvent::DayResolved { sample } if sample.day_offset == 3)
    })
    .await;
    let DriverEvent::DayResolved { sample } = event else {
        unreachable!()
    };
    assert_eq!(sample.steps, 4500);
    assert_eq!(sample.calories, 120);
    assert_eq!(sample.distance_meters, 3200);

    let snapshot = driver.snapshot().await;
    assert!(snapshot.history.iter().any(|s| s.day_offset == 3));
    // A non-today fetch never overwrites today's metrics.
    assert_eq!(snapshot.today.map(|s| s.day_offset), Some(0));
    driver.shutdown().await;
}

#[tokio::test]
async fn test_week_fetch_fills_history_in_order() {
    let (mock, driver, mut events) = driver_over_mock(config());
    mock.add_peripheral(Some(TARGET)).await;
    for offset in 0..=6u8 {
        mock.set_day(
            offset,
            MockDay {
                steps: 1000 + u16::from(offset),
                calories: 100,
                distance_meters: 800,
            },
        )
        .await;
    }
    driver.search().await.unwrap();
    wait_for_ready(&mut events).await;

    driver.fetch_last_7_days().await.unwrap();
    wait_for(&mut events, |e| matches!(e, DriverEvent::HistoryCleared)).await;
    for _ in 0..7 {
        wait_for(&mut events, |e| matches!(e, DriverEvent::DayResolved { .. })).await;
    }

    let snapshot = driver.snapshot().await;
    assert_eq!(snapshot.history.len(), 7);
    for (i, sample) in snapshot.history.iter().enumerate() {
        assert_eq!(sample.day_offset as usize, i);
        assert_eq!(sample.steps as usize, 1000 + i);
    }
    driver.shutdown().await;
}

#[tokio::test]
async fn test_step_requests_go_out_one_at_a_time() {
    let (mock, driver, mut events) = driver_over_mock(config());
    mock.add_peripheral(Some(TARGET)).await;
    driver.search().await.unwrap();
    wait_for_ready(&mut events).await;

    driver.fetch_last_7_days().await.unwrap();
    for _ in 0..7 {
        wait_for(&mut events, |e| matches!(e, DriverEvent::DayResolved { .. })).await;
    }

    // Each activity request was written only after the previous one
    // resolved, so the day offsets appear on the wire strictly in order.
    let written = mock.written().await;
    let day_offsets: Vec<u8> = written
        .iter()
        .filter(|frame| frame.first() == Some(&0x43))
        .map(|frame| frame[1])
        .collect();
    let week: Vec<u8> = day_offsets[day_offsets.len() - 7..].to_vec();
    assert_eq!(week, vec![0, 1, 2, 3, 4, 5, 6]);
    driver.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_lost_response_times_out_and_batch_continues() {
    let (mock, driver, mut events) = driver_over_mock(config());
    mock.add_peripheral(Some(TARGET)).await;
    driver.search().await.unwrap();
    wait_for_ready(&mut events).await;
    // Let the eager initial reads finish before scripting losses.
    wait_for(&mut events, |e| {
        matches!(e, DriverEvent::DayResolved { sample } if sample.day_offset == 0)
    })
    .await;

    mock.drop_responses(1).await;
    driver.fetch_last_7_days().await.unwrap();

    let event = wait_for(&mut events, |e| {
        matches!(e, DriverEvent::RequestTimedOut { .. })
    })
    .await;
    let DriverEvent::RequestTimedOut { day_offset, .. } = event else {
        unreachable!()
    };
    assert_eq!(day_offset, Some(0));

    // The remaining six days still resolve.
    for _ in 0..6 {
        wait_for(&mut events, |e| matches!(e, DriverEvent::DayResolved { .. })).await;
    }
    let snapshot = driver.snapshot().await;
    assert_eq!(snapshot.history.len(), 6);
    assert!(snapshot.history.iter().all(|s| s.day_offset != 0));
    // Day resolutions do not overwrite the degraded status.
    assert_eq!(snapshot.status, "Steps request timed out for day 0.");
    driver.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_battery_timeout_degrades_status() {
    let (mock, driver, mut events) = driver_over_mock(config());
    mock.add_peripheral(Some(TARGET)).await;
    driver.search().await.unwrap();
    wait_for_ready(&mut events).await;
    wait_for(&mut events, |e| {
        matches!(e, DriverEvent::DayResolved { sample } if sample.day_offset == 0)
    })
    .await;

    mock.drop_responses(1).await;
    driver.fetch_battery().await.unwrap();
    wait_for(&mut events, |e| {
        matches!(
            e,
            DriverEvent::RequestTimedOut {
                kind: RequestKind::Battery,
                day_offset: None,
            }
        )
    })
    .await;

    let snapshot = driver.snapshot().await;
    assert_eq!(snapshot.status, "Battery request timed out.");
    driver.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_scan_timeout_fails_search() {
    let (_mock, driver, mut events) =
        driver_over_mock(config().scan_timeout(Duration::from_secs(2)));
    driver.search().await.unwrap();

    wait_for(&mut events, |e| {
        matches!(
            e,
            DriverEvent::StateChanged {
                state: ConnectionState::Failed(_)
            }
        )
    })
    .await;

    let snapshot = driver.snapshot().await;
    assert_eq!(snapshot.status, "Search timed out. No device found.");
    assert!(!snapshot.connected);
    driver.shutdown().await;
}

#[tokio::test]
async fn test_non_matching_peripherals_are_listed_not_connected() {
    let (mock, driver, mut events) = driver_over_mock(config());
    mock.add_peripheral(Some("SomeOtherDevice")).await;
    mock.add_peripheral(None).await;
    driver.search().await.unwrap();

    wait_for(&mut events, |e| {
        matches!(e, DriverEvent::PeripheralDiscovered { .. })
    })
    .await;
    wait_for(&mut events, |e| {
        matches!(e, DriverEvent::PeripheralDiscovered { .. })
    })
    .await;

    assert_eq!(driver.discovered_peripherals().await.len(), 2);
    assert_eq!(driver.state().await, ConnectionState::Scanning);
    driver.shutdown().await;
}

#[tokio::test]
async fn test_connect_failure_reported() {
    let (mock, driver, mut events) = driver_over_mock(config());
    mock.add_peripheral(Some(TARGET)).await;
    mock.fail_next_connect("rejected by peripheral").await;
    driver.search().await.unwrap();

    wait_for(&mut events, |e| {
        matches!(
            e,
            DriverEvent::StateChanged {
                state: ConnectionState::Failed(_)
            }
        )
    })
    .await;
    let ConnectionState::Failed(reason) = driver.state().await else {
        panic!("expected failed state");
    };
    assert!(reason.contains("rejected by peripheral"));
    driver.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_clears_connection() {
    let (mock, driver, mut events) = driver_over_mock(config());
    mock.add_peripheral(Some(TARGET)).await;
    driver.search().await.unwrap();
    wait_for_ready(&mut events).await;

    driver.disconnect().await.unwrap();
    wait_for(&mut events, |e| {
        matches!(
            e,
            DriverEvent::StateChanged {
                state: ConnectionState::Disconnected
            }
        )
    })
    .await;

    let snapshot = driver.snapshot().await;
    assert!(!snapshot.connected);
    assert_eq!(snapshot.status, "Disconnected");
    driver.shutdown().await;
}

#[tokio::test]
async fn test_malformed_notification_is_dropped() {
    let (mock, driver, mut events) = driver_over_mock(config());
    mock.add_peripheral(Some(TARGET)).await;
    mock.set_battery(42).await;
    driver.search().await.unwrap();
    wait_for_ready(&mut events).await;
    wait_for(&mut events, |e| {
        matches!(e, DriverEvent::BatteryUpdated { percent: 42 })
    })
    .await;

    // Truncated frame and corrupt checksum, neither may touch the snapshot.
    mock.inject_notification(uuids::UART_TX, vec![0x03, 0x50]).await;
    let mut corrupt = vec![0u8; 16];
    corrupt[0] = 0x03;
    corrupt[1] = 0x09;
    corrupt[15] = 0xFF;
    mock.inject_notification(uuids::UART_TX, corrupt).await;

    // A later valid exchange still works.
    mock.set_battery(43).await;
    driver.fetch_battery().await.unwrap();
    wait_for(&mut events, |e| {
        matches!(e, DriverEvent::BatteryUpdated { percent: 43 })
    })
    .await;

    let snapshot = driver.snapshot().await;
    assert_eq!(snapshot.battery, 43);
    driver.shutdown().await;
}

#[tokio::test]
async fn test_fetch_without_connection_reports_error() {
    let (_mock, driver, mut events) = driver_over_mock(config());

    driver.fetch_battery().await.unwrap();
    let event = wait_for(&mut events, |e| matches!(e, DriverEvent::Error { .. })).await;
    let DriverEvent::Error { message } = event else {
        unreachable!()
    };
    assert!(message.contains("not connected"));
    driver.shutdown().await;
}

#[tokio::test]
async fn test_restarting_search_clears_previous_discoveries() {
    let (mock, driver, mut events) = driver_over_mock(config());
    mock.add_peripheral(Some("SomeOtherDevice")).await;
    driver.search().await.unwrap();
    wait_for(&mut events, |e| {
        matches!(e, DriverEvent::PeripheralDiscovered { .. })
    })
    .await;
    assert_eq!(driver.discovered_peripherals().await.len(), 1);

    driver.stop_search().await.unwrap();
    driver.search().await.unwrap();
    // The second scan rediscovers the scripted peripheral from scratch.
    wait_for(&mut events, |e| {
        matches!(e, DriverEvent::PeripheralDiscovered { .. })
    })
    .await;
    assert_eq!(driver.discovered_peripherals().await.len(), 1);
    driver.shutdown().await;
}
