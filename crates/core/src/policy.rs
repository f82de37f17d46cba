//! Mutation policy: decides from namespace and annotations whether a pod is
//! injected and with which profile.

use std::collections::{BTreeMap, BTreeSet};

pub const DEFAULT_INJECT_ANNOTATION: &str = "simple-sidecar.centml.ai/inject";
pub const DEFAULT_STATUS_ANNOTATION: &str = "simple-sidecar.centml.ai/status";
/// Status annotation value marking a pod as already mutated (compared case-insensitively).
pub const STATUS_INJECTED: &str = "injected";
pub const NAMESPACE_SYSTEM: &str = "kube-system";
pub const NAMESPACE_PUBLIC: &str = "kube-public";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    IgnoredNamespace,
    AlreadyInjected,
    NotRequested,
    UnknownProfile,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::IgnoredNamespace => "ignored_namespace",
            SkipReason::AlreadyInjected => "already_injected",
            SkipReason::NotRequested => "not_requested",
            SkipReason::UnknownProfile => "unknown_profile",
        }
    }
}

/// Evaluator output. A profile key only exists when injection is required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationDecision {
    Inject { profile: String },
    Skip(SkipReason),
}

/// Well-known annotation keys and the namespaces never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationPolicy {
    pub inject_key: String,
    pub status_key: String,
    pub ignored_namespaces: BTreeSet<String>,
}

impl Default for MutationPolicy {
    fn default() -> Self {
        Self {
            inject_key: DEFAULT_INJECT_ANNOTATION.to_string(),
            status_key: DEFAULT_STATUS_ANNOTATION.to_string(),
            ignored_namespaces: [NAMESPACE_SYSTEM, NAMESPACE_PUBLIC].iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl MutationPolicy {
    /// Add namespaces to the ignore set on top of the system ones.
    pub fn with_ignored<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_namespaces.extend(namespaces.into_iter().map(Into::into));
        self
    }

    /// Precedence: ignored namespace, then the injected marker, then the inject
    /// request. The marker wins over a fresh request so a pod is never injected twice.
    pub fn evaluate(&self, namespace: &str, annotations: Option<&BTreeMap<String, String>>) -> MutationDecision {
        if self.ignored_namespaces.contains(namespace) {
            return MutationDecision::Skip(SkipReason::IgnoredNamespace);
        }
        let Some(annotations) = annotations else {
            return MutationDecision::Skip(SkipReason::NotRequested);
        };
        let status = annotations.get(&self.status_key).map(String::as_str).unwrap_or("");
        if status.eq_ignore_ascii_case(STATUS_INJECTED) {
            return MutationDecision::Skip(SkipReason::AlreadyInjected);
        }
        match annotations.get(&self.inject_key) {
            Some(profile) => MutationDecision::Inject { profile: profile.clone() },
            None => MutationDecision::Skip(SkipReason::NotRequested),
        }
    }
}
