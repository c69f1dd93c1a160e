//! End-to-end pipeline tests over the mock transport: scheduling
//! discipline, validation fallbacks, hybrid overlay and aggregation, all
//! observed through published snapshots.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use fusion_model::{
    BatteryReading, CanaryPolicy, DeviceSerial, DeviceSpec, Field, PhaseType, TransportKind,
};
use fusionsrv::config::{GroupConfig, TransportEntry};
use fusionsrv::registry::{TransportRegistry, TransportSlot};
use fusionsrv::scheduler::RefreshTarget;
use fusionsrv::transport::{MockTransport, RangePayload, ReadRange};
use fusionsrv::{Coordinator, ServiceConfig, SnapshotStore, Validator};

struct Pipeline {
    coordinator: Coordinator,
    store: Arc<SnapshotStore>,
    registry: Arc<TransportRegistry>,
}

fn device(serial: &str, transports: Vec<TransportKind>, has_battery: bool) -> DeviceSpec {
    DeviceSpec {
        serial: DeviceSerial::new(serial),
        model: "hybrid-12k".to_string(),
        phase: PhaseType::ThreePhase,
        smart_ports: 0,
        has_battery,
        transports,
    }
}

fn entry(kind: TransportKind, endpoint: &str, devices: &[&str]) -> TransportEntry {
    TransportEntry {
        kind,
        endpoint: endpoint.to_string(),
        poll_interval_secs: 1,
        timeout_ms: 2_000,
        static_ttl_secs: 3_600,
        devices: devices.iter().map(|d| DeviceSerial::new(*d)).collect(),
    }
}

fn pipeline(
    devices: Vec<DeviceSpec>,
    slots: Vec<TransportSlot>,
    groups: Vec<GroupConfig>,
) -> Pipeline {
    let transports = slots.iter().map(|s| s.entry.clone()).collect();
    let config = Arc::new(ServiceConfig {
        tick_interval_secs: 1,
        canary_enabled: true,
        rejection_log_cooldown_secs: 60,
        log_level: "info".to_string(),
        devices,
        transports,
        groups,
    });
    let registry = Arc::new(TransportRegistry::new(slots));
    let validator = Arc::new(Validator::new(
        CanaryPolicy::default(),
        true,
        Duration::from_secs(60),
    ));
    let store = Arc::new(SnapshotStore::new());
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let (_refresh_tx, refresh_rx) = mpsc::channel(4);

    Pipeline {
        coordinator: Coordinator::new(
            config,
            registry.clone(),
            validator,
            store.clone(),
            shutdown_rx,
            refresh_rx,
        ),
        store,
        registry,
    }
}

fn script_ranges(mock: &MockTransport, serial: &str, realtime: RangePayload) {
    mock.push_range(serial, ReadRange::Realtime, realtime);
    mock.push_range(serial, ReadRange::Phases, RangePayload::default());
    mock.push_range(
        serial,
        ReadRange::StaticInfo,
        RangePayload::default().with_field("reg_fw_code", 30201.0),
    );
}

fn bank_payload(batteries: Vec<BatteryReading>) -> RangePayload {
    let mut payload = RangePayload::default();
    payload.batteries = batteries;
    payload
}

fn battery(index: u8, current_capacity: f64, max_capacity: f64) -> BatteryReading {
    BatteryReading {
        index,
        soc: current_capacity / max_capacity * 100.0,
        current: 2.0,
        current_capacity,
        max_capacity,
    }
}

#[tokio::test]
async fn shared_endpoint_reads_never_overlap() {
    let mock =
        MockTransport::new(TransportKind::Dongle).with_read_delay(Duration::from_millis(20));
    script_ranges(&mock, "INV-001", RangePayload::default().with_field("reg_pv_power", 3000.0));
    script_ranges(&mock, "INV-002", RangePayload::default().with_field("reg_pv_power", 2800.0));

    let slot = TransportSlot {
        entry: entry(TransportKind::Dongle, "10.0.0.5:8899", &["INV-001", "INV-002"]),
        client: Arc::new(mock.clone()),
    };
    let mut p = pipeline(
        vec![
            device("INV-001", vec![TransportKind::Dongle], false),
            device("INV-002", vec![TransportKind::Dongle], false),
        ],
        vec![slot],
        vec![],
    );

    p.coordinator.force_refresh(&RefreshTarget::All).await;

    assert_eq!(mock.calls().len(), 6);
    assert_eq!(mock.max_observed_in_flight(), 1, "shared link must serialize");
}

#[tokio::test]
async fn distinct_endpoints_read_concurrently() {
    // One mock cloned into two slots: the in-flight gauge is shared, the
    // endpoints are distinct.
    let mock =
        MockTransport::new(TransportKind::ModbusTcp).with_read_delay(Duration::from_millis(40));
    script_ranges(&mock, "INV-001", RangePayload::default());
    script_ranges(&mock, "INV-002", RangePayload::default());

    let slot_a = TransportSlot {
        entry: entry(TransportKind::ModbusTcp, "10.0.0.2:502", &["INV-001"]),
        client: Arc::new(mock.clone()),
    };
    let slot_b = TransportSlot {
        entry: entry(TransportKind::ModbusTcp, "10.0.0.3:502", &["INV-002"]),
        client: Arc::new(mock.clone()),
    };
    let mut p = pipeline(
        vec![
            device("INV-001", vec![TransportKind::ModbusTcp], false),
            device("INV-002", vec![TransportKind::ModbusTcp], false),
        ],
        vec![slot_a, slot_b],
        vec![],
    );

    p.coordinator.force_refresh(&RefreshTarget::All).await;

    assert_eq!(mock.max_observed_in_flight(), 2, "distinct links must overlap");
}

#[tokio::test]
async fn snapshot_fields_stable_without_fresh_reading() {
    let mock = MockTransport::new(TransportKind::ModbusTcp);
    script_ranges(&mock, "INV-001", RangePayload::default().with_field("reg_pv_power", 4000.0));

    let slot = TransportSlot {
        entry: entry(TransportKind::ModbusTcp, "10.0.0.2:502", &["INV-001"]),
        client: Arc::new(mock.clone()),
    };
    let mut p = pipeline(
        vec![device("INV-001", vec![TransportKind::ModbusTcp], false)],
        vec![slot],
        vec![],
    );

    p.coordinator.force_refresh(&RefreshTarget::All).await;
    let first = p.store.current();
    assert_eq!(
        first.device(&DeviceSerial::new("INV-001")).unwrap().reading.get(Field::PvPower),
        Some(4000.0)
    );

    // Next cycle fails every range: published values must not change.
    p.registry.invalidate_static(&DeviceSerial::new("INV-001"));
    p.coordinator.force_refresh(&RefreshTarget::All).await;

    let second = p.store.current();
    assert!(second.version > first.version);
    assert_eq!(
        second.device(&DeviceSerial::new("INV-001")).unwrap().reading.get(Field::PvPower),
        Some(4000.0)
    );
}

#[tokio::test]
async fn lifetime_counter_misread_keeps_published_value() {
    let mock = MockTransport::new(TransportKind::ModbusTcp);
    script_ranges(
        &mock,
        "INV-001",
        RangePayload::default().with_field("reg_e_pv_total", 1369.2),
    );

    let slot = TransportSlot {
        entry: entry(TransportKind::ModbusTcp, "10.0.0.2:502", &["INV-001"]),
        client: Arc::new(mock.clone()),
    };
    let mut p = pipeline(
        vec![device("INV-001", vec![TransportKind::ModbusTcp], false)],
        vec![slot],
        vec![],
    );
    p.coordinator.force_refresh(&RefreshTarget::All).await;

    // Next cycle misreads the counter as zero; other fields stay valid.
    mock.push_range(
        "INV-001",
        ReadRange::Realtime,
        RangePayload::default()
            .with_field("reg_e_pv_total", 0.0)
            .with_field("reg_pv_power", 500.0),
    );
    mock.push_range("INV-001", ReadRange::Phases, RangePayload::default());
    p.coordinator.force_refresh(&RefreshTarget::All).await;

    let snapshot = p.store.current();
    let reading = &snapshot.device(&DeviceSerial::new("INV-001")).unwrap().reading;
    assert_eq!(reading.get(Field::LifetimePvEnergy), Some(1369.2));
    assert_eq!(reading.get(Field::PvPower), Some(500.0));
}

#[tokio::test]
async fn canary_rejection_retains_prior_grid_frequency() {
    let mock = MockTransport::new(TransportKind::ModbusTcp);
    script_ranges(
        &mock,
        "INV-001",
        RangePayload::default().with_field("reg_grid_freq", 50.0),
    );

    let slot = TransportSlot {
        entry: entry(TransportKind::ModbusTcp, "10.0.0.2:502", &["INV-001"]),
        client: Arc::new(mock.clone()),
    };
    let mut p = pipeline(
        vec![device("INV-001", vec![TransportKind::ModbusTcp], false)],
        vec![slot],
        vec![],
    );
    p.coordinator.force_refresh(&RefreshTarget::All).await;

    // 150 Hz is a misread; 0 Hz is a legitimate off-grid value.
    mock.push_range(
        "INV-001",
        ReadRange::Realtime,
        RangePayload::default().with_field("reg_grid_freq", 150.0),
    );
    mock.push_range("INV-001", ReadRange::Phases, RangePayload::default());
    p.coordinator.force_refresh(&RefreshTarget::All).await;
    assert_eq!(
        p.store
            .current()
            .device(&DeviceSerial::new("INV-001"))
            .unwrap()
            .reading
            .get(Field::GridFrequency),
        Some(50.0)
    );

    mock.push_range(
        "INV-001",
        ReadRange::Realtime,
        RangePayload::default().with_field("reg_grid_freq", 0.0),
    );
    mock.push_range("INV-001", ReadRange::Phases, RangePayload::default());
    p.coordinator.force_refresh(&RefreshTarget::All).await;
    assert_eq!(
        p.store
            .current()
            .device(&DeviceSerial::new("INV-001"))
            .unwrap()
            .reading
            .get(Field::GridFrequency),
        Some(0.0)
    );
}

#[tokio::test]
async fn secondary_bus_battery_count_overrides_cloud_zero() {
    let cloud = MockTransport::new(TransportKind::Cloud);
    let mut batch = HashMap::new();
    batch.insert(
        DeviceSerial::new("INV-001"),
        RangePayload::default()
            .with_field("batCount", 0.0)
            .with_field("ppv", 3000.0),
    );
    cloud.push_batch(batch);

    let local = MockTransport::new(TransportKind::ModbusTcp);
    local.push_range("INV-001", ReadRange::Realtime, RangePayload::default());
    local.push_range("INV-001", ReadRange::Phases, RangePayload::default());
    local.push_range(
        "INV-001",
        ReadRange::BatteryBank,
        bank_payload(vec![battery(0, 250.0, 280.0), battery(1, 240.0, 280.0)]),
    );
    local.push_range("INV-001", ReadRange::StaticInfo, RangePayload::default());

    let slots = vec![
        TransportSlot {
            entry: entry(TransportKind::Cloud, "acct-1", &["INV-001"]),
            client: Arc::new(cloud),
        },
        TransportSlot {
            entry: entry(TransportKind::ModbusTcp, "10.0.0.2:502", &["INV-001"]),
            client: Arc::new(local),
        },
    ];
    let mut p = pipeline(
        vec![device(
            "INV-001",
            vec![TransportKind::Cloud, TransportKind::ModbusTcp],
            true,
        )],
        slots,
        vec![GroupConfig {
            id: "garage".to_string(),
            members: vec![DeviceSerial::new("INV-001")],
        }],
    );

    p.coordinator.force_refresh(&RefreshTarget::All).await;

    let snapshot = p.store.current();
    let state = snapshot.device(&DeviceSerial::new("INV-001")).unwrap();
    assert_eq!(state.bank.as_ref().unwrap().battery_count, 2);
    assert_eq!(snapshot.groups["garage"].battery_count, 2);
    // Cloud telemetry still merged alongside the bank.
    assert_eq!(state.reading.get(Field::PvPower), Some(3000.0));
}

#[tokio::test]
async fn group_soc_is_capacity_weighted() {
    let mock = MockTransport::new(TransportKind::ModbusTcp);
    for serial in ["INV-001", "INV-002"] {
        mock.push_range(serial, ReadRange::Realtime, RangePayload::default());
        mock.push_range(serial, ReadRange::Phases, RangePayload::default());
        mock.push_range(serial, ReadRange::StaticInfo, RangePayload::default());
    }
    mock.push_range(
        "INV-001",
        ReadRange::BatteryBank,
        bank_payload(vec![battery(0, 280.0, 280.0)]),
    );
    mock.push_range(
        "INV-002",
        ReadRange::BatteryBank,
        bank_payload(vec![battery(0, 100.0, 200.0)]),
    );

    let slot = TransportSlot {
        entry: entry(TransportKind::ModbusTcp, "10.0.0.2:502", &["INV-001", "INV-002"]),
        client: Arc::new(mock),
    };
    let mut p = pipeline(
        vec![
            device("INV-001", vec![TransportKind::ModbusTcp], true),
            device("INV-002", vec![TransportKind::ModbusTcp], true),
        ],
        vec![slot],
        vec![GroupConfig {
            id: "garage".to_string(),
            members: vec![DeviceSerial::new("INV-001"), DeviceSerial::new("INV-002")],
        }],
    );

    p.coordinator.force_refresh(&RefreshTarget::All).await;

    let snapshot = p.store.current();
    let group = &snapshot.groups["garage"];
    assert_eq!(group.reporting_members, 2);
    let soc = group.soc.unwrap();
    // (280 + 100) / (280 + 200) = 79.17%, not the 87.5% arithmetic mean.
    assert!((soc - 79.1666).abs() < 0.01, "got {soc}");
}
