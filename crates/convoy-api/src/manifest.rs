//! Service manifests.
//!
//! A manifest is a small YAML document:
//!
//! ```yaml
//! kind: Service
//! metadata:
//!   name: api
//! spec:
//!   replicas: 3
//!   image: registry.local/api@sha256-v2
//!   rollout:
//!     strategy: Canary
//!     steps: [{ percent: 50 }, { percent: 100 }]
//!     pauseSeconds: 5
//!   livenessProbe: { initialDelaySeconds: 1, periodSeconds: 2, failureThreshold: 3 }
//!   autoscale: { targetCPU: 60, min: 1, max: 5 }
//!   env:
//!     - { name: HEALTHY, value: "1" }
//! ```
//!
//! Every optional field is defaulted here, once, so the reconciler only
//! ever sees a fully resolved [`Service`].

use serde::Deserialize;

use convoy_state::{
    AutoscalePolicy, EnvVar, ProbePolicy, RolloutPolicy, RolloutProgress, RolloutStep,
    RolloutStrategy, Service,
};

/// Image used when a manifest does not name one.
pub const DEFAULT_IMAGE: &str = "local://demo@v1";

const MAX_NAME_LEN: usize = 63;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ManifestError {
    #[error("invalid YAML: {0}")]
    Yaml(String),

    #[error("expected kind: Service")]
    WrongKind,

    #[error("metadata.name required")]
    MissingName,

    #[error("invalid service name {0:?}: use letters, digits, '-', '_' or '.' (max 63)")]
    InvalidName(String),

    #[error("rollout step percent {0} is outside 0..=100")]
    StepPercent(u32),

    #[error("autoscale min {min} exceeds max {max}")]
    AutoscaleBounds { min: u32, max: u32 },

    #[error("{0} must be a non-negative number of seconds")]
    Seconds(&'static str),

    #[error("env var {0} must have a scalar value")]
    EnvValue(String),
}

// ── Wire shape ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Document {
    kind: Option<String>,
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    spec: ServiceSpec,
}

#[derive(Debug, Default, Deserialize)]
struct Metadata {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ServiceSpec {
    replicas: Option<u32>,
    image: Option<String>,
    rollout: Option<RolloutSpec>,
    readiness_probe: Option<ProbeSpec>,
    liveness_probe: Option<ProbeSpec>,
    autoscale: Option<AutoscaleSpec>,
    env: Vec<EnvSpec>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RolloutSpec {
    strategy: Option<RolloutStrategy>,
    steps: Vec<RolloutStep>,
    pause_seconds: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ProbeSpec {
    initial_delay_seconds: Option<f64>,
    period_seconds: Option<f64>,
    failure_threshold: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AutoscaleSpec {
    #[serde(rename = "targetCPU")]
    target_cpu: Option<u32>,
    min: Option<u32>,
    max: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct EnvSpec {
    name: String,
    #[serde(default)]
    value: serde_yaml::Value,
}

// ── Resolution ────────────────────────────────────────────────────

/// Parse and validate a manifest into a fully defaulted [`Service`].
///
/// The returned service has zero simulated CPU and a fresh rollout
/// progress; applying a manifest restarts any staged rollout.
pub fn parse_manifest(text: &str) -> Result<Service, ManifestError> {
    let doc: Document =
        serde_yaml::from_str(text).map_err(|e| ManifestError::Yaml(e.to_string()))?;

    if doc.kind.as_deref() != Some("Service") {
        return Err(ManifestError::WrongKind);
    }

    let name = doc
        .metadata
        .name
        .filter(|n| !n.trim().is_empty())
        .ok_or(ManifestError::MissingName)?;
    validate_name(&name)?;

    let spec = doc.spec;
    let image = spec.image.unwrap_or_else(|| DEFAULT_IMAGE.to_string());

    Ok(Service {
        replicas: spec.replicas.unwrap_or(1),
        digest: digest_of(&image).to_string(),
        env: resolve_env(spec.env)?,
        rollout: resolve_rollout(spec.rollout)?,
        readiness: resolve_probe(spec.readiness_probe, "readinessProbe")?,
        liveness: resolve_probe(spec.liveness_probe, "livenessProbe")?,
        autoscale: spec.autoscale.map(resolve_autoscale).transpose()?,
        cpu: 0,
        progress: RolloutProgress::default(),
        name,
    })
}

/// The digest part of `repo@digest`, or the whole reference when there is no `@`.
pub fn digest_of(image: &str) -> &str {
    match image.split_once('@') {
        Some((_, digest)) => digest,
        None => image,
    }
}

fn validate_name(name: &str) -> Result<(), ManifestError> {
    let ok = name.len() <= MAX_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if ok {
        Ok(())
    } else {
        Err(ManifestError::InvalidName(name.to_string()))
    }
}

fn seconds_to_ms(secs: f64, field: &'static str) -> Result<u64, ManifestError> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(ManifestError::Seconds(field));
    }
    Ok((secs * 1000.0).round() as u64)
}

fn resolve_rollout(spec: Option<RolloutSpec>) -> Result<RolloutPolicy, ManifestError> {
    let defaults = RolloutPolicy::default();
    let Some(spec) = spec else {
        return Ok(defaults);
    };

    if let Some(step) = spec.steps.iter().find(|s| s.percent > 100) {
        return Err(ManifestError::StepPercent(step.percent));
    }

    let pause_ms = match spec.pause_seconds {
        Some(secs) => seconds_to_ms(secs, "rollout.pauseSeconds")?,
        None => defaults.pause_ms,
    };

    Ok(RolloutPolicy {
        strategy: spec.strategy.unwrap_or(RolloutStrategy::Immediate),
        steps: spec.steps,
        pause_ms,
    })
}

fn resolve_probe(spec: Option<ProbeSpec>, field: &'static str) -> Result<ProbePolicy, ManifestError> {
    let defaults = ProbePolicy::default();
    let Some(spec) = spec else {
        return Ok(defaults);
    };

    let initial_delay_ms = match spec.initial_delay_seconds {
        Some(secs) => seconds_to_ms(secs, field)?,
        None => defaults.initial_delay_ms,
    };
    let period_ms = match spec.period_seconds {
        Some(secs) => seconds_to_ms(secs, field)?,
        None => defaults.period_ms,
    };

    Ok(ProbePolicy {
        initial_delay_ms,
        period_ms,
        failure_threshold: spec.failure_threshold.unwrap_or(defaults.failure_threshold),
    })
}

fn resolve_autoscale(spec: AutoscaleSpec) -> Result<AutoscalePolicy, ManifestError> {
    let defaults = AutoscalePolicy::default();
    let policy = AutoscalePolicy {
        // A zero target would scale up on any load at all.
        target_cpu: spec.target_cpu.filter(|t| *t > 0).unwrap_or(defaults.target_cpu),
        min: spec.min.unwrap_or(defaults.min),
        max: spec.max.unwrap_or(defaults.max),
    };
    if policy.min > policy.max {
        return Err(ManifestError::AutoscaleBounds {
            min: policy.min,
            max: policy.max,
        });
    }
    Ok(policy)
}

fn resolve_env(env: Vec<EnvSpec>) -> Result<Vec<EnvVar>, ManifestError> {
    env.into_iter()
        .map(|e| {
            let value = match e.value {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                serde_yaml::Value::Null => String::new(),
                _ => return Err(ManifestError::EnvValue(e.name)),
            };
            Ok(EnvVar { name: e.name, value })
        })
        .collect()
}
