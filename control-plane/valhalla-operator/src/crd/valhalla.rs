use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Finalizer token that blocks deletion until cleanup has recorded its status.
pub const FINALIZER: &str = "valhalla.oaas.io/finalizer";

/// Annotation that pauses reconciliation when set to the literal `"true"`.
pub const PAUSED_ANNOTATION: &str = "valhalla.oaas.io/operator.paused";

const DEFAULT_THREADS_PER_POD: i32 = 2;
const DEFAULT_TRAFFIC_SCHEDULE: &str = "0 * * * *";

#[derive(
    CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, Default,
    PartialEq,
)]
#[kube(
    group = "valhalla.oaas.io",
    version = "v1alpha1",
    kind = "Valhalla",
    plural = "valhallas",
    shortname = "vh",
    namespaced,
    status = "ValhallaStatus",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Paused","type":"boolean","jsonPath":".status.paused"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ValhallaSpec {
    /// URL of the OpenStreetMap PBF extract the map builder downloads.
    pub pbf_url: String,
    /// Image override for both the map builder and the serving workers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub persistence: PersistenceSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_replicas: Option<i32>,
    /// Minimum number of serving pods kept through voluntary disruptions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_available: Option<i32>,
    /// Worker concurrency hint passed to every serving pod.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads_per_pod: Option<i32>,
    /// Per-replica resource requests and limits of the serving workers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_traffic: Option<PredictedTrafficSpec>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
    /// Requested size of the shared tile volume (e.g. "10Gi").
    #[serde(default)]
    pub storage: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    /// ClusterIP | NodePort | LoadBalancer
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PredictedTrafficSpec {
    /// Cron schedule of the refresh job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpecError {
    #[error("pbfUrl must not be empty")]
    MissingPbfUrl,
    #[error("pbfUrl must be an http(s) URL: {0}")]
    InvalidPbfUrl(String),
    #[error("pbfUrl must end in a plain file name without query or fragment: {0}")]
    PbfFileName(String),
    #[error("persistence.storage must not be empty")]
    MissingStorage,
    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: i32 },
    #[error("maxReplicas ({max}) must not be lower than minReplicas ({min})")]
    ReplicaBounds { min: i32, max: i32 },
}

impl ValhallaSpec {
    pub fn min_replicas(&self) -> i32 {
        self.min_replicas.unwrap_or(1)
    }

    pub fn max_replicas(&self) -> i32 {
        self.max_replicas.unwrap_or_else(|| self.min_replicas())
    }

    pub fn min_available(&self) -> IntOrString {
        IntOrString::Int(self.min_available.unwrap_or(1))
    }

    pub fn threads_per_pod(&self) -> i32 {
        self.threads_per_pod.unwrap_or(DEFAULT_THREADS_PER_POD)
    }

    pub fn resources(&self) -> ResourceRequirements {
        self.resources.clone().unwrap_or_default()
    }

    pub fn traffic_schedule(&self) -> &str {
        self.predicted_traffic
            .as_ref()
            .and_then(|p| p.schedule.as_deref())
            .unwrap_or(DEFAULT_TRAFFIC_SCHEDULE)
    }

    /// Last path segment of the PBF URL, used as the on-disk file name.
    pub fn pbf_file_name(&self) -> &str {
        self.pbf_url.trim().rsplit('/').next().unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), SpecError> {
        let url = self.pbf_url.trim();
        if url.is_empty() {
            return Err(SpecError::MissingPbfUrl);
        }
        let Some((_, rest)) = url
            .split_once("://")
            .filter(|(scheme, _)| matches!(*scheme, "http" | "https"))
        else {
            return Err(SpecError::InvalidPbfUrl(url.to_string()));
        };
        // the last segment becomes a path inside the builder script
        let file = rest.split_once('/').map(|(_, path)| path).unwrap_or_default();
        let file = file.rsplit('/').next().unwrap_or_default();
        let plain = file
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
        if !plain || file.chars().all(|c| c == '.') {
            return Err(SpecError::PbfFileName(url.to_string()));
        }
        if self.persistence.storage.trim().is_empty() {
            return Err(SpecError::MissingStorage);
        }
        for (field, value) in [
            ("minReplicas", self.min_replicas),
            ("maxReplicas", self.max_replicas),
            ("threadsPerPod", self.threads_per_pod),
        ] {
            if let Some(v) = value {
                if v <= 0 {
                    return Err(SpecError::NonPositive { field, value: v });
                }
            }
        }
        if let Some(v) = self.min_available {
            if v < 0 {
                return Err(SpecError::NonPositive {
                    field: "minAvailable",
                    value: v,
                });
            }
        }
        let (min, max) = (self.min_replicas(), self.max_replicas());
        if max < min {
            return Err(SpecError::ReplicaBounds { min, max });
        }
        Ok(())
    }
}

/// Lifecycle phase. Ordering is significant: a phase never moves backwards
/// while the instance exists.
#[derive(
    Deserialize,
    Serialize,
    Clone,
    Copy,
    Debug,
    JsonSchema,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
)]
pub enum Phase {
    #[default]
    Empty,
    MapBuilding,
    Serving,
}

impl Phase {
    pub fn next(self) -> Self {
        match self {
            Phase::Empty => Phase::MapBuilding,
            Phase::MapBuilding | Phase::Serving => Phase::Serving,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Empty => write!(f, "Empty"),
            Phase::MapBuilding => write!(f, "MapBuilding"),
            Phase::Serving => write!(f, "Serving"),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValhallaStatus {
    /// True once the operator has noticed the pause annotation.
    #[serde(default)]
    pub paused: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default)]
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl ValhallaStatus {
    pub fn condition(&self, type_: ConditionType) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: ConditionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(
        rename = "lastTransitionTime",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_transition_time: Option<String>,
}

#[derive(
    Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq, Hash,
)]
pub enum ConditionType {
    Available,
    AllReplicasReady,
    ReconciliationSuccess,
}

impl ConditionType {
    /// Tracked condition types in their canonical status order.
    pub const ALL: [ConditionType; 3] = [
        ConditionType::Available,
        ConditionType::AllReplicasReady,
        ConditionType::ReconciliationSuccess,
    ];
}

#[derive(
    Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq, Hash,
)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl From<bool> for ConditionStatus {
    fn from(v: bool) -> Self {
        if v {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        }
    }
}

impl Valhalla {
    pub fn has_finalizer(&self) -> bool {
        self.finalizers().iter().any(|f| f == FINALIZER)
    }

    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn phase(&self) -> Phase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }
}
