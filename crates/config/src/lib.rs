//! Sidecar config: loads the named injection profiles from a YAML file into an
//! immutable registry, and renders a registry back to YAML.
//!
//! File shape: a mapping of profile name to profile. A profile left empty
//! (`name:` with no body) is a legal, empty profile.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use metrics::gauge;
use serde_yaml::Value;
use sidecar_core::{InjectionProfile, ProfileRegistry};
use tracing::{debug, info};

fn max_config_bytes() -> usize {
    std::env::var("SIDECAR_MAX_CONFIG_BYTES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(1_000_000) // 1 MiB default
}

/// Read and parse a profile file.
pub fn load_registry(path: impl AsRef<Path>) -> Result<ProfileRegistry> {
    let path = path.as_ref();
    let yaml = std::fs::read_to_string(path).with_context(|| format!("reading config file {}", path.display()))?;
    let registry = parse_registry(&yaml).with_context(|| format!("parsing config file {}", path.display()))?;
    gauge!("config_profiles_loaded", registry.len() as f64);
    info!(path = %path.display(), profiles = registry.len(), names = ?registry.names(), "loaded injection profiles");
    Ok(registry)
}

pub fn parse_registry(yaml: &str) -> Result<ProfileRegistry> {
    if yaml.len() > max_config_bytes() {
        return Err(anyhow!("config payload too large (>{} bytes)", max_config_bytes()));
    }
    if yaml.lines().map(str::trim).all(|l| l.is_empty() || l.starts_with('#')) {
        debug!("empty config document");
        return Ok(ProfileRegistry::new());
    }
    let doc: Value = serde_yaml::from_str(yaml).context("parsing YAML")?;
    let doc = match doc {
        Value::Null => return Ok(ProfileRegistry::new()),
        Value::Mapping(m) => m,
        _ => return Err(anyhow!("config must be a mapping of profile name to profile")),
    };
    let mut profiles = Vec::with_capacity(doc.len());
    for (key, value) in doc {
        let name = profile_name(key)?;
        let profile: Option<InjectionProfile> =
            serde_yaml::from_value(value).with_context(|| format!("decoding injection profile {:?}", name))?;
        profiles.push((name, profile.unwrap_or_default()));
    }
    Ok(profiles.into_iter().collect())
}

/// Scalar keys become their string form, so `123:` or `true:` name a profile
/// the same way the annotation value would.
fn profile_name(key: Value) -> Result<String> {
    match key {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok("null".to_string()),
        other => Err(anyhow!("profile name must be a scalar, got {:?}", other)),
    }
}

/// Render profiles as YAML, sorted by name.
pub fn render_registry(registry: &ProfileRegistry) -> Result<String> {
    let sorted: BTreeMap<&str, &InjectionProfile> = registry.iter_sorted().into_iter().collect();
    serde_yaml::to_string(&sorted).context("rendering profiles as YAML")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_comment_only_documents_are_empty() {
        assert!(parse_registry("").unwrap().is_empty());
        assert!(parse_registry("  \n\t\n").unwrap().is_empty());
        assert!(parse_registry("# nothing yet\n").unwrap().is_empty());
    }

    #[test]
    fn bare_profile_name_is_an_empty_profile() {
        let reg = parse_registry("noop:\n").unwrap();
        assert_eq!(reg.get("noop"), Some(&InjectionProfile::default()));
    }

    #[test]
    fn non_mapping_document_is_rejected() {
        let e = parse_registry("- a\n- b\n").unwrap_err().to_string();
        assert!(e.contains("mapping"), "e={}", e);
    }

    #[test]
    fn scalar_profile_names_are_stringified() {
        let reg = parse_registry("123:\n  containers:\n    - name: a\ntrue:\n  containers:\n    - name: b\n").unwrap();
        assert_eq!(reg.names(), vec!["123", "true"]);
        assert_eq!(reg.get("123").unwrap().containers[0].name, "a");
        assert_eq!(reg.get("true").unwrap().containers[0].name, "b");
    }

    #[test]
    fn non_scalar_profile_name_is_rejected() {
        let e = parse_registry("? [a, b]\n: {}\n").unwrap_err().to_string();
        assert!(e.contains("scalar"), "e={}", e);
    }

    #[test]
    fn unknown_profile_fields_are_ignored() {
        let reg = parse_registry("web:\n  containers: []\n  futureField: 1\n").unwrap();
        assert_eq!(reg.get("web"), Some(&InjectionProfile::default()));
    }

    #[test]
    fn malformed_yaml_is_reported() {
        let e = parse_registry("web: [unclosed\n").unwrap_err();
        assert!(format!("{:#}", e).contains("parsing YAML"), "e={:#}", e);
    }

    #[test]
    fn render_is_sorted_and_omits_empty_fields() {
        let reg = parse_registry(
            "zeta:\n  containers:\n    - name: z\nalpha:\n  envVars:\n    - name: A\n      value: \"1\"\n",
        )
        .unwrap();
        let out = render_registry(&reg).unwrap();
        let alpha = out.find("alpha:").unwrap();
        let zeta = out.find("zeta:").unwrap();
        assert!(alpha < zeta, "out={}", out);
        assert!(!out.contains("initContainers"), "out={}", out);
        assert_eq!(parse_registry(&out).unwrap(), reg);
    }
}
