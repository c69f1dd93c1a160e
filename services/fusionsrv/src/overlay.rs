//! Hybrid overlay and per-device merge
//!
//! Combines the prior published state with what each transport produced
//! this tick. For hybrid devices (cloud + local attached) the cloud reading
//! is the baseline and a fixed whitelist of local-only fields replaces the
//! cloud values when a valid local reading exists this cycle. Fields nobody
//! produced this tick keep their prior sample: stale-good, never blank.

use fusion_model::{AcceptedReading, DeviceSpec, ValidatedReading, LOCAL_OVERLAY_FIELDS};

/// Merge one device's tick results into its next published reading.
pub fn merge_device(
    spec: &DeviceSpec,
    prior: Option<&ValidatedReading>,
    cloud: Option<&AcceptedReading>,
    local: Option<&AcceptedReading>,
) -> ValidatedReading {
    let mut merged = prior.cloned().unwrap_or_default();

    if let Some(cloud) = cloud {
        for (&field, &sample) in &cloud.fields {
            merged.fields.insert(field, sample);
        }
    }

    if let Some(local) = local {
        let hybrid = spec.is_hybrid();
        for (&field, &sample) in &local.fields {
            let cloud_holds_field = merged
                .fields
                .get(&field)
                .is_some_and(|s| !s.source.is_local());
            // In hybrid mode only whitelisted fields may displace a
            // cloud-sourced value; everything else the local read offers
            // fills gaps the cloud does not cover.
            if !hybrid || LOCAL_OVERLAY_FIELDS.contains(&field) || !cloud_holds_field {
                merged.fields.insert(field, sample);
            }
        }
    }

    // Secondary-bus battery data is local-only truth; the cloud list is
    // used only when no local transport reports the bank.
    let fresh_batteries = local
        .and_then(|l| l.batteries.clone())
        .or_else(|| cloud.and_then(|c| c.batteries.clone()));
    if let Some(batteries) = fresh_batteries {
        merged.batteries = batteries;
    }

    merged
}
