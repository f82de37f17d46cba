//! JSON Patch (RFC 6902) operation model.
//!
//! Operations are built once by the patch builder and never mutated. The
//! receiver must apply them strictly in emission order: per-container paths
//! (`/spec/containers/{i}/...`) address containers by their index in the
//! submitted pod, and later operations assume the arrays created earlier in
//! the same patch exist.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Container, EnvVar, Volume, VolumeMount};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Replace,
}

/// Payload shapes the builder emits. Serialized untagged: on the wire a
/// value is just the bare JSON array, object or string.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PatchValue {
    Containers(Vec<Container>),
    Container(Box<Container>),
    Volumes(Vec<Volume>),
    Volume(Box<Volume>),
    EnvVars(Vec<EnvVar>),
    EnvVar(EnvVar),
    VolumeMounts(Vec<VolumeMount>),
    VolumeMount(VolumeMount),
    Annotations(BTreeMap<String, String>),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchOperation {
    pub op: PatchOp,
    pub path: String,
    pub value: PatchValue,
}

impl PatchOperation {
    pub fn add(path: impl Into<String>, value: PatchValue) -> Self {
        Self { op: PatchOp::Add, path: path.into(), value }
    }

    pub fn replace(path: impl Into<String>, value: PatchValue) -> Self {
        Self { op: PatchOp::Replace, path: path.into(), value }
    }
}

/// Escape a single JSON Pointer reference token (RFC 6901 §3).
pub fn escape_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

/// Serialize an ordered patch into the bytes attached to an admission response.
pub fn to_bytes(patch: &[PatchOperation]) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(patch)
}
