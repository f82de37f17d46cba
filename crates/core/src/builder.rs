//! Patch synthesis: turns a pod snapshot and a profile into ordered JSON Patch
//! operations.
//!
//! Step order is part of the contract: existing-container mutations first,
//! then new objects, then annotation bookkeeping last, so a patch never marks
//! a pod injected without carrying the injected objects as well.

use std::collections::BTreeMap;

use crate::patch::{escape_token, PatchOperation, PatchValue};
use crate::pod::PodSnapshot;
use crate::profile::InjectionProfile;

const INIT_CONTAINERS_PATH: &str = "/spec/initContainers";
const CONTAINERS_PATH: &str = "/spec/containers";
const VOLUMES_PATH: &str = "/spec/volumes";
const ANNOTATIONS_PATH: &str = "/metadata/annotations";

pub fn build_patch(
    pod: &PodSnapshot<'_>,
    profile: &InjectionProfile,
    bookkeeping: &BTreeMap<String, String>,
) -> Vec<PatchOperation> {
    let mut patch = Vec::new();
    add_volume_mounts(&mut patch, pod, profile);
    add_env_vars(&mut patch, pod, profile);
    append_or_create(
        &mut patch,
        INIT_CONTAINERS_PATH,
        pod.init_containers.len(),
        &profile.init_containers,
        PatchValue::Containers,
        |c| PatchValue::Container(Box::new(c)),
    );
    append_or_create(
        &mut patch,
        CONTAINERS_PATH,
        pod.containers.len(),
        &profile.containers,
        PatchValue::Containers,
        |c| PatchValue::Container(Box::new(c)),
    );
    append_or_create(
        &mut patch,
        VOLUMES_PATH,
        pod.volumes.len(),
        &profile.volumes,
        PatchValue::Volumes,
        |v| PatchValue::Volume(Box::new(v)),
    );
    update_annotations(&mut patch, pod.annotations, bookkeeping);
    patch
}

/// Append every profile mount to every existing container. A container without
/// a `volumeMounts` field gets an empty array first so the `-` appends resolve.
fn add_volume_mounts(patch: &mut Vec<PatchOperation>, pod: &PodSnapshot<'_>, profile: &InjectionProfile) {
    if profile.volume_mounts.is_empty() {
        return;
    }
    for (i, container) in pod.containers.iter().enumerate() {
        let base = format!("{CONTAINERS_PATH}/{i}/volumeMounts");
        if container.volume_mounts.is_none() {
            patch.push(PatchOperation::add(base.clone(), PatchValue::VolumeMounts(Vec::new())));
        }
        for vm in &profile.volume_mounts {
            patch.push(PatchOperation::add(format!("{base}/-"), PatchValue::VolumeMount(vm.clone())));
        }
    }
}

/// Append every profile env var to every existing container, creating `env`
/// where it is absent. Emits nothing at all for a profile without env vars.
fn add_env_vars(patch: &mut Vec<PatchOperation>, pod: &PodSnapshot<'_>, profile: &InjectionProfile) {
    if profile.env_vars.is_empty() {
        return;
    }
    for (i, container) in pod.containers.iter().enumerate() {
        let base = format!("{CONTAINERS_PATH}/{i}/env");
        if container.env.is_none() {
            patch.push(PatchOperation::add(base.clone(), PatchValue::EnvVars(Vec::new())));
        }
        for env in &profile.env_vars {
            tracing::trace!(path = %base, name = %env.name, "append env var");
            patch.push(PatchOperation::add(format!("{base}/-"), PatchValue::EnvVar(env.clone())));
        }
    }
}

/// An absent or empty target array is created whole in one operation; a
/// populated one is appended to element by element, keeping declared order.
fn append_or_create<T: Clone>(
    patch: &mut Vec<PatchOperation>,
    base: &str,
    existing: usize,
    added: &[T],
    whole: impl Fn(Vec<T>) -> PatchValue,
    one: impl Fn(T) -> PatchValue,
) {
    if added.is_empty() {
        return;
    }
    if existing == 0 {
        patch.push(PatchOperation::add(base, whole(added.to_vec())));
        return;
    }
    let path = format!("{base}/-");
    for item in added {
        patch.push(PatchOperation::add(path.clone(), one(item.clone())));
    }
}

/// Add or replace bookkeeping annotations.
///
/// - no annotations mapping: add the whole mapping (only for the first key;
///   later keys see the mapping as present);
/// - key missing or empty: add just that key, leaving other annotations alone;
/// - key with a value: replace it.
fn update_annotations(
    patch: &mut Vec<PatchOperation>,
    current: Option<&BTreeMap<String, String>>,
    added: &BTreeMap<String, String>,
) {
    let mut mapping_exists = current.is_some();
    for (key, value) in added {
        let has_value = current.and_then(|a| a.get(key)).is_some_and(|v| !v.is_empty());
        if !mapping_exists {
            let whole = BTreeMap::from([(key.clone(), value.clone())]);
            patch.push(PatchOperation::add(ANNOTATIONS_PATH, PatchValue::Annotations(whole)));
            mapping_exists = true;
        } else if has_value {
            let path = format!("{ANNOTATIONS_PATH}/{}", escape_token(key));
            patch.push(PatchOperation::replace(path, PatchValue::Text(value.clone())));
        } else {
            let path = format!("{ANNOTATIONS_PATH}/{}", escape_token(key));
            patch.push(PatchOperation::add(path, PatchValue::Text(value.clone())));
        }
    }
}
