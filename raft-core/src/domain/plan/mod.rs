// raft-core/src/domain/plan/mod.rs

pub mod encode;

use crate::domain::error::DomainError;
use serde::{Deserialize, Serialize};

/// Closed allow-list of run targets.
pub const ALLOWED_RUN_TARGETS: &[&str] = &["governor.one_cycle"];

/// Artifacts root every written path must live under.
pub const ARTIFACTS_ROOT: &str = "artifacts";

/// Cap on `WriteFile` content, in UTF-8 bytes.
pub const MAX_WRITEFILE_CONTENT_BYTES: usize = 1_000_000;

/// Operator-supplied intended action sequence. Proven before any
/// (out-of-scope) execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Plan {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u64>,
    pub steps: Vec<Step>,
}

/// Tagged step variants. Unknown fields on any step are rejected at
/// deserialization (the payloads carry `deny_unknown_fields`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op")]
pub enum Step {
    Fetch(FetchStep),
    WriteFile(WriteFileStep),
    Run(RunStep),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FetchStep {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_as: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct WriteFileStep {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RunStep {
    pub target: String,
}

impl Step {
    pub fn op(&self) -> &'static str {
        match self {
            Step::Fetch(_) => "Fetch",
            Step::WriteFile(_) => "WriteFile",
            Step::Run(_) => "Run",
        }
    }
}

impl Plan {
    /// Validate every invariant of the DSL, normalizing stored paths to
    /// forward slashes. On failure nothing is kept; the error names the
    /// offending field path.
    pub fn validate(mut self) -> Result<Plan, DomainError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("name", "plan name must be non-empty"));
        }
        self.name = name.to_string();

        if self.steps.is_empty() {
            return Err(DomainError::validation(
                "steps",
                "plan must contain at least one step",
            ));
        }

        for (idx, step) in self.steps.iter_mut().enumerate() {
            match step {
                Step::Fetch(fetch) => {
                    validate_url(&fetch.url)
                        .map_err(|m| DomainError::validation(format!("steps[{idx}].url"), m))?;
                    if let Some(save_as) = &fetch.save_as {
                        let normalized = validate_artifact_path(save_as).map_err(|m| {
                            DomainError::validation(format!("steps[{idx}].save_as"), m)
                        })?;
                        fetch.save_as = Some(normalized);
                    }
                }
                Step::WriteFile(write) => {
                    let normalized = validate_artifact_path(&write.path)
                        .map_err(|m| DomainError::validation(format!("steps[{idx}].path"), m))?;
                    write.path = normalized;
                    if write.content.len() > MAX_WRITEFILE_CONTENT_BYTES {
                        return Err(DomainError::validation(
                            format!("steps[{idx}].content"),
                            format!("content too large; limit is {MAX_WRITEFILE_CONTENT_BYTES} bytes"),
                        ));
                    }
                }
                Step::Run(run) => {
                    if !ALLOWED_RUN_TARGETS.contains(&run.target.as_str()) {
                        return Err(DomainError::validation(
                            format!("steps[{idx}].target"),
                            format!("target must be one of: [{}]", ALLOWED_RUN_TARGETS.join(", ")),
                        ));
                    }
                }
            }
        }

        Ok(self)
    }

    /// Deterministic JSON used as the cache key material: serde_json's
    /// default map is ordered, so value-level round-tripping sorts keys.
    pub fn canonical_json(&self) -> Result<String, serde_json::Error> {
        let value = serde_json::to_value(self)?;
        serde_json::to_string(&value)
    }
}

/// Scheme must be http/https (case-insensitive) with a non-empty host.
fn validate_url(url: &str) -> Result<(), String> {
    let Some((scheme, rest)) = url.split_once("://") else {
        return Err("url must be http/https and include a host".to_string());
    };
    let scheme = scheme.to_ascii_lowercase();
    if scheme != "http" && scheme != "https" {
        return Err("url must be http/https and include a host".to_string());
    }
    let host = rest.split(['/', '?', '#']).next().unwrap_or("");
    if host.is_empty() {
        return Err("url must be http/https and include a host".to_string());
    }
    Ok(())
}

/// Relative path strictly under the artifacts root, no traversal, no
/// trailing separator; backslashes normalized to forward slashes and
/// `.` / doubled separators collapsed so audit logs stay canonical.
fn validate_artifact_path(path: &str) -> Result<String, String> {
    if path.contains('\u{0}') {
        return Err("path must not contain NUL bytes".to_string());
    }
    let normalized = path.replace('\\', "/");
    let normalized = normalized.trim();
    if normalized.starts_with('/') || normalized.contains(":/") {
        return Err("path must be relative".to_string());
    }
    if normalized.ends_with('/') {
        return Err("path must not end with a separator".to_string());
    }
    let parts: Vec<&str> = normalized
        .split('/')
        .filter(|p| !p.is_empty() && *p != ".")
        .collect();
    if parts.iter().any(|p| *p == "..") {
        return Err("path must not contain '..'".to_string());
    }
    if parts.first() != Some(&ARTIFACTS_ROOT) {
        return Err(format!("path must be inside {ARTIFACTS_ROOT}/"));
    }
    if parts.len() < 2 {
        return Err(format!("path must reference a file inside {ARTIFACTS_ROOT}/"));
    }
    Ok(parts.join("/"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn fetch(url: &str) -> Step {
        Step::Fetch(FetchStep {
            url: url.to_string(),
            save_as: None,
        })
    }

    fn write(path: &str) -> Step {
        Step::WriteFile(WriteFileStep {
            path: path.to_string(),
            content: "x".to_string(),
        })
    }

    fn plan_of(steps: Vec<Step>) -> Plan {
        Plan {
            name: "p".to_string(),
            tokens: None,
            steps,
        }
    }

    #[test]
    fn test_valid_plan_round_trips() {
        let plan = plan_of(vec![
            fetch("https://a.b"),
            write("artifacts/a.txt"),
            Step::Run(RunStep {
                target: "governor.one_cycle".to_string(),
            }),
        ]);
        let validated = plan.validate().unwrap();
        assert_eq!(validated.steps.len(), 3);
    }

    #[test]
    fn test_empty_name_rejected() {
        let plan = Plan {
            name: "   ".to_string(),
            tokens: None,
            steps: vec![fetch("https://a.b")],
        };
        let err = plan.validate().unwrap_err();
        assert!(matches!(err, DomainError::Validation { field, .. } if field == "name"));
    }

    #[test]
    fn test_empty_steps_rejected() {
        let err = plan_of(vec![]).validate().unwrap_err();
        assert!(matches!(err, DomainError::Validation { field, .. } if field == "steps"));
    }

    #[test]
    fn test_url_scheme_is_case_insensitive() {
        plan_of(vec![fetch("HTTPS://example.org")]).validate().unwrap();
        let err = plan_of(vec![fetch("ftp://example.org")])
            .validate()
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation { field, .. } if field == "steps[0].url"));
    }

    #[test]
    fn test_url_without_host_rejected() {
        assert!(plan_of(vec![fetch("http://")]).validate().is_err());
    }

    #[test]
    fn test_traversal_path_rejected() {
        let err = plan_of(vec![write("../../etc/passwd")]).validate().unwrap_err();
        assert!(matches!(err, DomainError::Validation { field, .. } if field == "steps[0].path"));
    }

    #[test]
    fn test_path_must_be_strictly_under_artifacts() {
        assert!(plan_of(vec![write("artifacts")]).validate().is_err());
        assert!(plan_of(vec![write("artifacts/")]).validate().is_err());
        assert!(plan_of(vec![write("other/a.txt")]).validate().is_err());
        assert!(plan_of(vec![write("/artifacts/a.txt")]).validate().is_err());
    }

    #[test]
    fn test_backslashes_normalize_before_storage() {
        let plan = plan_of(vec![write(r"artifacts\sub\a.txt")]).validate().unwrap();
        match &plan.steps[0] {
            Step::WriteFile(w) => assert_eq!(w.path, "artifacts/sub/a.txt"),
            other => panic!("unexpected step {other:?}"),
        }
    }

    #[test]
    fn test_dot_segments_and_doubled_separators_collapse() {
        let plan = plan_of(vec![write("./artifacts//notes//a.txt")])
            .validate()
            .unwrap();
        match &plan.steps[0] {
            Step::WriteFile(w) => assert_eq!(w.path, "artifacts/notes/a.txt"),
            other => panic!("unexpected step {other:?}"),
        }
        // A bare "." inside artifacts still fails the strict-containment rule.
        assert!(plan_of(vec![write("artifacts/.")]).validate().is_err());
    }

    #[test]
    fn test_save_as_shares_path_rules() {
        let plan = plan_of(vec![Step::Fetch(FetchStep {
            url: "https://a.b".to_string(),
            save_as: Some(r"artifacts\out.bin".to_string()),
        })]);
        let validated = plan.validate().unwrap();
        match &validated.steps[0] {
            Step::Fetch(f) => assert_eq!(f.save_as.as_deref(), Some("artifacts/out.bin")),
            other => panic!("unexpected step {other:?}"),
        }

        let bad = plan_of(vec![Step::Fetch(FetchStep {
            url: "https://a.b".to_string(),
            save_as: Some("../loot".to_string()),
        })]);
        let err = bad.validate().unwrap_err();
        assert!(matches!(err, DomainError::Validation { field, .. } if field == "steps[0].save_as"));
    }

    #[test]
    fn test_content_size_cap() {
        let step = Step::WriteFile(WriteFileStep {
            path: "artifacts/big.bin".to_string(),
            content: "x".repeat(MAX_WRITEFILE_CONTENT_BYTES + 1),
        });
        let err = plan_of(vec![step]).validate().unwrap_err();
        assert!(matches!(err, DomainError::Validation { field, .. } if field == "steps[0].content"));
    }

    #[test]
    fn test_run_target_allow_list_is_closed() {
        let err = plan_of(vec![Step::Run(RunStep {
            target: "governor.two_cycles".to_string(),
        })])
        .validate()
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation { field, .. } if field == "steps[0].target"));
    }

    #[test]
    fn test_unknown_step_fields_rejected() {
        let json = r#"{"name":"p","steps":[{"op":"Run","target":"governor.one_cycle","extra":1}]}"#;
        let parsed: Result<Plan, _> = serde_json::from_str(json);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_canonical_json_is_key_sorted_and_stable() {
        let a: Plan =
            serde_json::from_str(r#"{"steps":[{"op":"Fetch","url":"https://a.b"}],"name":"p"}"#)
                .unwrap();
        let b: Plan =
            serde_json::from_str(r#"{"name":"p","steps":[{"op":"Fetch","url":"https://a.b"}]}"#)
                .unwrap();
        assert_eq!(a.canonical_json().unwrap(), b.canonical_json().unwrap());
        insta::assert_snapshot!(
            a.canonical_json().unwrap(),
            @r#"{"name":"p","steps":[{"op":"Fetch","url":"https://a.b"}]}"#
        );
    }
}
