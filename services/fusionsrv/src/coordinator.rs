//! Tick coordinator
//!
//! Drives the poll cycle: once per tick the scheduler picks the due
//! endpoint groups, one task per group reads its devices (cloud batched,
//! local strictly sequential on the shared link), then a join barrier
//! closes the cycle before validation, overlay merge, aggregation and one
//! atomic snapshot publish.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info, warn};

use fusion_model::{
    AcceptedReading, DeviceSerial, DeviceSpec, DeviceState, EndpointKey, Field, RawReading,
    SmartPortState, Snapshot, TransportKind, ValidatedReading,
};

use crate::aggregator;
use crate::config::ServiceConfig;
use crate::error::{FusionError, Result};
use crate::overlay;
use crate::reader::{CloudReader, LocalReader};
use crate::registry::{TransportRegistry, DEGRADED_THRESHOLD};
use crate::scheduler::{EndpointGroup, EndpointScheduler, RefreshTarget};
use crate::snapshot::SnapshotStore;
use crate::validator::Validator;

/// Result of one endpoint group's read task
struct GroupOutcome {
    key: EndpointKey,
    success: bool,
    raws: Vec<(DeviceSerial, RawReading)>,
}

/// Per-device transport results accumulated over one tick
#[derive(Default)]
struct TickInput {
    cloud: Option<AcceptedReading>,
    local: Option<AcceptedReading>,
}

pub struct Coordinator {
    config: Arc<ServiceConfig>,
    registry: Arc<TransportRegistry>,
    scheduler: EndpointScheduler,
    validator: Arc<Validator>,
    store: Arc<SnapshotStore>,
    /// Last published per-device state, the retention baseline
    state: HashMap<DeviceSerial, ValidatedReading>,
    shutdown: watch::Receiver<bool>,
    refresh: mpsc::Receiver<RefreshTarget>,
}

impl Coordinator {
    pub fn new(
        config: Arc<ServiceConfig>,
        registry: Arc<TransportRegistry>,
        validator: Arc<Validator>,
        store: Arc<SnapshotStore>,
        shutdown: watch::Receiver<bool>,
        refresh: mpsc::Receiver<RefreshTarget>,
    ) -> Self {
        let scheduler = EndpointScheduler::new(registry.clone());
        Self {
            config,
            registry,
            scheduler,
            validator,
            store,
            state: HashMap::new(),
            shutdown,
            refresh,
        }
    }

    /// Main loop: interval ticks, forced refreshes, shutdown.
    pub async fn run(&mut self) {
        let mut interval = tokio::time::interval(self.config.tick_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(
            tick_secs = self.config.tick_interval_secs,
            devices = self.config.devices.len(),
            transports = self.config.transports.len(),
            "coordinator started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick_now().await;
                }
                Some(target) = self.refresh.recv() => {
                    info!(?target, "forced refresh");
                    self.force_refresh(&target).await;
                }
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        info!("coordinator shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Run one interval-gated cycle.
    pub async fn tick_now(&mut self) {
        let groups = self.scheduler.due_groups(Instant::now());
        if !groups.is_empty() {
            self.run_cycle(groups).await;
        }
    }

    /// Run one cycle for a forced refresh target, bypassing gating. The work
    /// still goes through the normal read, validate, merge, publish path.
    pub async fn force_refresh(&mut self, target: &RefreshTarget) {
        let groups = self.scheduler.forced_groups(target);
        if !groups.is_empty() {
            self.run_cycle(groups).await;
        }
    }

    async fn run_cycle(&mut self, groups: Vec<EndpointGroup>) {
        let now = Instant::now();
        let mut tasks: JoinSet<GroupOutcome> = JoinSet::new();

        for group in groups {
            let Some(slot) = self.registry.slot(&group.key).cloned() else {
                continue;
            };
            self.registry.mark_attempt(&group.key, now);

            let registry = self.registry.clone();
            let config = self.config.clone();
            tasks.spawn(async move {
                if slot.entry.kind == TransportKind::Cloud {
                    read_cloud_group(&slot, &group).await
                } else {
                    read_local_group(&registry, &config, &slot, &group, now).await
                }
            });
        }

        // Join barrier: the tick's data set closes here.
        let mut raws: Vec<(DeviceSerial, RawReading)> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    if outcome.success {
                        self.registry.mark_success(&outcome.key);
                    } else {
                        let failures = self.registry.mark_failure(&outcome.key);
                        if failures == DEGRADED_THRESHOLD {
                            warn!(endpoint = %outcome.key, failures,
                                  "endpoint degraded, devices reported uncertain");
                        }
                    }
                    raws.extend(outcome.raws);
                }
                Err(e) => error!(error = %e, "group read task panicked"),
            }
        }

        // Validate each raw reading against the prior published state,
        // then fold per device by transport locality.
        let mut inputs: HashMap<DeviceSerial, TickInput> = HashMap::new();
        for (serial, raw) in raws {
            let accepted = self
                .validator
                .validate(&serial, &raw, self.state.get(&serial));
            if accepted.is_empty() {
                continue;
            }
            let input = inputs.entry(serial).or_default();
            let slot = if raw.provenance.is_local() {
                &mut input.local
            } else {
                &mut input.cloud
            };
            match slot {
                Some(existing) => {
                    existing.fields.extend(accepted.fields);
                    if accepted.batteries.is_some() {
                        existing.batteries = accepted.batteries;
                    }
                }
                None => *slot = Some(accepted),
            }
        }

        let mut fresh: HashSet<DeviceSerial> = HashSet::new();
        for (serial, input) in inputs {
            let Some(spec) = self.config.device(&serial) else {
                continue;
            };
            let merged = overlay::merge_device(
                spec,
                self.state.get(&serial),
                input.cloud.as_ref(),
                input.local.as_ref(),
            );
            self.state.insert(serial.clone(), merged);
            fresh.insert(serial);
        }

        self.publish(&fresh);
    }

    /// Assemble and publish one complete snapshot.
    fn publish(&self, fresh: &HashSet<DeviceSerial>) {
        let mut snapshot = Snapshot::empty();
        snapshot.captured_at = Utc::now();

        for spec in &self.config.devices {
            let reading = self.state.get(&spec.serial).cloned().unwrap_or_default();
            let smart_ports = reading
                .get(Field::SmartPortStatus)
                .map(|raw| SmartPortState::decode(raw as u16, spec.smart_ports))
                .unwrap_or_default();
            snapshot.devices.insert(
                spec.serial.clone(),
                DeviceState {
                    degraded: self.device_degraded(spec),
                    bank: aggregator::bank_aggregates(&reading),
                    smart_ports,
                    reading,
                },
            );
        }

        // Group sums run over each member's retained reading so totals do
        // not oscillate with endpoint scheduling; reporting_members labels
        // how many members were freshly read this tick.
        for group in &self.config.groups {
            match aggregator::group_aggregates(group, &self.state, fresh) {
                Ok(agg) => {
                    snapshot.groups.insert(group.id.clone(), agg);
                }
                Err(e) => warn!(group = %group.id, error = %e, "group aggregate suppressed"),
            }
        }

        for slot in self.registry.slots() {
            let key = slot.entry.key();
            snapshot
                .endpoints
                .insert(key.to_string(), self.registry.health(&key));
        }

        self.store.publish(snapshot);
    }

    /// A device is degraded only when every endpoint serving it is; one
    /// healthy transport still delivers data.
    fn device_degraded(&self, spec: &DeviceSpec) -> bool {
        let mut serving = self
            .registry
            .slots()
            .iter()
            .filter(|s| s.entry.devices.contains(&spec.serial))
            .peekable();
        serving.peek().is_some()
            && serving.all(|s| self.registry.is_degraded(&s.entry.key()))
    }

    /// Pass one parameter write through to the external transport layer,
    /// preferring a local link. A write to a static field invalidates the
    /// cached static range so the next poll re-reads it.
    pub async fn write_param(
        &self,
        device: &DeviceSerial,
        field: Field,
        value: f64,
    ) -> Result<()> {
        let slot = self
            .registry
            .slots()
            .iter()
            .filter(|s| s.entry.devices.contains(device))
            .min_by_key(|s| usize::from(!s.entry.kind.is_local()))
            .ok_or_else(|| {
                FusionError::Config(format!("no transport serves device {device}"))
            })?;
        let key = slot.entry.key();

        tokio::time::timeout(
            slot.entry.timeout(),
            slot.client.write_param(device, field, value),
        )
        .await
        .map_err(|_| FusionError::Timeout {
            endpoint: key.clone(),
        })?
        .map_err(|e| FusionError::Transport {
            endpoint: key.clone(),
            source: e,
        })?;

        info!(device = %device, field = %field, value, endpoint = %key, "parameter written");
        if field.is_static() {
            self.registry.invalidate_static(device);
        }
        Ok(())
    }
}

async fn read_cloud_group(
    slot: &crate::registry::TransportSlot,
    group: &EndpointGroup,
) -> GroupOutcome {
    match CloudReader::poll(slot, &group.devices).await {
        Ok(readings) => GroupOutcome {
            key: group.key.clone(),
            success: !readings.is_empty(),
            raws: readings.into_iter().collect(),
        },
        Err(e) => {
            if e.needs_external_action() {
                error!(endpoint = %group.key, error = %e, "cloud poll needs external action");
            } else {
                warn!(endpoint = %group.key, error = %e, "cloud poll failed");
            }
            GroupOutcome {
                key: group.key.clone(),
                success: false,
                raws: Vec::new(),
            }
        }
    }
}

async fn read_local_group(
    registry: &TransportRegistry,
    config: &ServiceConfig,
    slot: &crate::registry::TransportSlot,
    group: &EndpointGroup,
    now: Instant,
) -> GroupOutcome {
    let mut raws = Vec::new();
    let mut any_success = false;

    // Strictly sequential: the shared link tolerates one open session.
    for serial in &group.devices {
        let Some(spec) = config.device(serial) else {
            warn!(device = %serial, endpoint = %group.key, "configured on endpoint but not in device list");
            continue;
        };
        let outcome = LocalReader::poll_device(registry, slot, spec, now).await;
        if outcome.is_success() {
            any_success = true;
        }
        if !outcome.reading.is_empty() {
            raws.push((serial.clone(), outcome.reading));
        }
        if outcome.timed_out {
            // A wedged link will not answer for its other devices either;
            // the rest of the group waits for the next cycle.
            warn!(endpoint = %group.key, "link timed out, skipping remaining devices this tick");
            break;
        }
    }

    GroupOutcome {
        key: group.key.clone(),
        success: any_success,
        raws,
    }
}
