//! Orchestration: policy, registry lookup and patch synthesis composed into one
//! admission outcome.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::builder::build_patch;
use crate::patch;
use crate::pod::PodSnapshot;
use crate::policy::{MutationDecision, MutationPolicy, SkipReason, STATUS_INJECTED};
use crate::profile::ProfileRegistry;

/// Result of one admission decision. Only an internal fault produces `Deny`;
/// policy outcomes always admit the pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Allow(SkipReason),
    AllowWithPatch { profile: String, operations: usize, patch: Vec<u8> },
    Deny(String),
}

impl Outcome {
    pub fn is_allowed(&self) -> bool { !matches!(self, Outcome::Deny(_)) }
}

pub fn decide(pod: &PodSnapshot<'_>, registry: &ProfileRegistry, policy: &MutationPolicy) -> Outcome {
    debug!(namespace = %pod.namespace, pod = %pod.name, annotations = ?pod.annotations, "evaluating mutation policy");
    let profile_key = match policy.evaluate(pod.namespace, pod.annotations) {
        MutationDecision::Skip(reason) => {
            info!(namespace = %pod.namespace, pod = %pod.name, reason = reason.as_str(), "skipping mutation due to policy check");
            return Outcome::Allow(reason);
        }
        MutationDecision::Inject { profile } => profile,
    };

    let Some(profile) = registry.get(&profile_key) else {
        warn!(namespace = %pod.namespace, pod = %pod.name, profile = %profile_key, "skipping mutation: no configuration for profile");
        return Outcome::Allow(SkipReason::UnknownProfile);
    };

    if profile.is_empty() {
        info!(namespace = %pod.namespace, pod = %pod.name, profile = %profile_key, "profile is empty, only marking pod as injected");
    }

    let bookkeeping = BTreeMap::from([(policy.status_key.clone(), STATUS_INJECTED.to_string())]);
    let ops = build_patch(pod, profile, &bookkeeping);
    match patch::to_bytes(&ops) {
        Ok(bytes) => {
            info!(namespace = %pod.namespace, pod = %pod.name, profile = %profile_key, operations = ops.len(), "built injection patch");
            Outcome::AllowWithPatch { profile: profile_key, operations: ops.len(), patch: bytes }
        }
        Err(e) => {
            warn!(namespace = %pod.namespace, pod = %pod.name, error = %e, "failed to serialize patch");
            Outcome::Deny(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{DEFAULT_INJECT_ANNOTATION, DEFAULT_STATUS_ANNOTATION};
    use crate::profile::InjectionProfile;
    use k8s_openapi::api::core::v1::Pod;
    use serde_json::json;

    fn registry() -> ProfileRegistry {
        let web: InjectionProfile = serde_json::from_value(json!({"containers": [{"name": "sidecar", "image": "busybox"}]})).unwrap();
        [("web".to_string(), web)].into_iter().collect()
    }

    #[test]
    fn unknown_profile_is_allowed_without_patch() {
        let pod: Pod = serde_json::from_value(json!({
            "metadata": {"namespace": "default", "annotations": {DEFAULT_INJECT_ANNOTATION: "nope"}},
            "spec": {"containers": []}
        }))
        .unwrap();
        let out = decide(&PodSnapshot::from_pod(&pod, None), &registry(), &MutationPolicy::default());
        assert_eq!(out, Outcome::Allow(SkipReason::UnknownProfile));
        assert!(out.is_allowed());
    }

    #[test]
    fn status_key_follows_policy() {
        let policy = MutationPolicy { status_key: "x/status".into(), ..Default::default() };
        let pod: Pod = serde_json::from_value(json!({
            "metadata": {"namespace": "default", "annotations": {DEFAULT_INJECT_ANNOTATION: "web"}},
            "spec": {"containers": [{"name": "app"}]}
        }))
        .unwrap();
        let out = decide(&PodSnapshot::from_pod(&pod, None), &registry(), &policy);
        let Outcome::AllowWithPatch { patch, operations, profile } = out else { panic!("expected patch") };
        assert_eq!(profile, "web");
        assert_eq!(operations, 2);
        let v: serde_json::Value = serde_json::from_slice(&patch).unwrap();
        assert_eq!(v[1], json!({"op": "add", "path": "/metadata/annotations/x~1status", "value": "injected"}));
        assert!(!String::from_utf8(patch).unwrap().contains(DEFAULT_STATUS_ANNOTATION));
    }

    #[test]
    fn empty_profile_only_writes_status() {
        let registry: ProfileRegistry = [("noop".to_string(), InjectionProfile::default())].into_iter().collect();
        let pod: Pod = serde_json::from_value(json!({
            "metadata": {"namespace": "default", "annotations": {DEFAULT_INJECT_ANNOTATION: "noop"}},
            "spec": {"containers": [{"name": "app"}]}
        }))
        .unwrap();
        let out = decide(&PodSnapshot::from_pod(&pod, None), &registry, &MutationPolicy::default());
        let Outcome::AllowWithPatch { patch, operations, .. } = out else { panic!("expected patch") };
        assert_eq!(operations, 1);
        let v: serde_json::Value = serde_json::from_slice(&patch).unwrap();
        assert_eq!(v[0]["path"], "/metadata/annotations/simple-sidecar.centml.ai~1status");
    }

    #[test]
    fn only_deny_is_not_allowed() {
        assert!(Outcome::Allow(SkipReason::NotRequested).is_allowed());
        assert!(Outcome::AllowWithPatch { profile: "web".into(), operations: 0, patch: b"[]".to_vec() }.is_allowed());
        assert!(!Outcome::Deny("boom".into()).is_allowed());
    }
}
