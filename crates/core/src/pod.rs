//! Read-only view of the parts of a pod the mutation engine looks at.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Container, Pod, Volume};

#[derive(Debug, Clone, Copy)]
pub struct PodSnapshot<'a> {
    /// `metadata.name`, or `generateName` when the name is not assigned yet. Logging only.
    pub name: &'a str,
    pub namespace: &'a str,
    pub annotations: Option<&'a BTreeMap<String, String>>,
    pub init_containers: &'a [Container],
    pub containers: &'a [Container],
    pub volumes: &'a [Volume],
}

impl<'a> PodSnapshot<'a> {
    /// Borrow a snapshot from a pod. `fallback_namespace` (usually the admission
    /// request's namespace) is used when the pod object carries none.
    pub fn from_pod(pod: &'a Pod, fallback_namespace: Option<&'a str>) -> Self {
        let meta = &pod.metadata;
        let name = meta.name.as_deref().or(meta.generate_name.as_deref()).unwrap_or("");
        let namespace = meta
            .namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .or(fallback_namespace)
            .unwrap_or("");
        let (init_containers, containers, volumes) = match pod.spec.as_ref() {
            Some(spec) => (
                spec.init_containers.as_deref().unwrap_or(&[]),
                spec.containers.as_slice(),
                spec.volumes.as_deref().unwrap_or(&[]),
            ),
            None => (&[][..], &[][..], &[][..]),
        };
        Self { name, namespace, annotations: meta.annotations.as_ref(), init_containers, containers, volumes }
    }

    pub fn annotation(&self, key: &str) -> Option<&'a str> {
        self.annotations.and_then(|a| a.get(key)).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn falls_back_to_request_namespace() {
        let pod: Pod = serde_json::from_value(json!({
            "metadata": {"generateName": "web-"},
            "spec": {"containers": [{"name": "app"}]}
        }))
        .unwrap();
        let snap = PodSnapshot::from_pod(&pod, Some("team-a"));
        assert_eq!(snap.namespace, "team-a");
        assert_eq!(snap.name, "web-");
        assert_eq!(snap.containers.len(), 1);
        assert!(snap.init_containers.is_empty());
        assert!(snap.annotations.is_none());
    }

    #[test]
    fn pod_namespace_wins_over_fallback() {
        let pod: Pod = serde_json::from_value(json!({
            "metadata": {"name": "p", "namespace": "default", "annotations": {"k": "v"}},
            "spec": {"containers": []}
        }))
        .unwrap();
        let snap = PodSnapshot::from_pod(&pod, Some("other"));
        assert_eq!(snap.namespace, "default");
        assert_eq!(snap.annotation("k"), Some("v"));
        assert_eq!(snap.annotation("missing"), None);
    }

    #[test]
    fn missing_spec_reads_as_empty() {
        let pod = Pod::default();
        let snap = PodSnapshot::from_pod(&pod, None);
        assert!(snap.containers.is_empty());
        assert!(snap.volumes.is_empty());
        assert_eq!(snap.namespace, "");
    }
}
