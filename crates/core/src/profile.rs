//! Injection profiles and the named registry they are looked up in.

use k8s_openapi::api::core::v1::{Container, EnvVar, Volume, VolumeMount};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// A named bundle of objects merged into a pod. Every field defaults to empty.
///
/// Field names are camelCase; the PascalCase spellings of older config files
/// are accepted as aliases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InjectionProfile {
    #[serde(alias = "InitContainers", skip_serializing_if = "Vec::is_empty")]
    pub init_containers: Vec<Container>,
    #[serde(alias = "Containers", skip_serializing_if = "Vec::is_empty")]
    pub containers: Vec<Container>,
    #[serde(alias = "Volumes", skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
    #[serde(alias = "EnvVars", skip_serializing_if = "Vec::is_empty")]
    pub env_vars: Vec<EnvVar>,
    #[serde(alias = "VolumeMounts", skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
}

impl InjectionProfile {
    /// True when applying the profile would only write the status annotation.
    pub fn is_empty(&self) -> bool {
        self.init_containers.is_empty()
            && self.containers.is_empty()
            && self.volumes.is_empty()
            && self.env_vars.is_empty()
            && self.volume_mounts.is_empty()
    }
}

/// Immutable map of profile name to profile. Built once at startup and shared
/// read-only; lookups are exact and case-sensitive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileRegistry {
    profiles: FxHashMap<String, InjectionProfile>,
}

impl ProfileRegistry {
    pub fn new() -> Self { Self::default() }

    pub fn get(&self, name: &str) -> Option<&InjectionProfile> { self.profiles.get(name) }

    pub fn len(&self) -> usize { self.profiles.len() }

    pub fn is_empty(&self) -> bool { self.profiles.is_empty() }

    /// Profile names in sorted order (registry iteration order is unspecified).
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Profiles sorted by name, for stable rendering.
    pub fn iter_sorted(&self) -> Vec<(&str, &InjectionProfile)> {
        let mut out: Vec<_> = self.profiles.iter().map(|(k, v)| (k.as_str(), v)).collect();
        out.sort_unstable_by(|a, b| a.0.cmp(b.0));
        out
    }
}

impl FromIterator<(String, InjectionProfile)> for ProfileRegistry {
    fn from_iter<I: IntoIterator<Item = (String, InjectionProfile)>>(iter: I) -> Self {
        Self { profiles: iter.into_iter().collect() }
    }
}
