//! Typed platform objects.
//!
//! These are thin data shapes for the objects a workflow instance owns. They
//! carry no behavior beyond identity and owner bookkeeping; the store decides
//! what exists.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::workflow::WorkflowInstance;

/// Kind of a managed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Service,
    ServiceAccount,
    ClusterRole,
    ClusterRoleBinding,
    Role,
    RoleBinding,
    StatefulSet,
    ConfigMap,
    Deployment,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Service => "Service",
            Self::ServiceAccount => "ServiceAccount",
            Self::ClusterRole => "ClusterRole",
            Self::ClusterRoleBinding => "ClusterRoleBinding",
            Self::Role => "Role",
            Self::RoleBinding => "RoleBinding",
            Self::StatefulSet => "StatefulSet",
            Self::ConfigMap => "ConfigMap",
            Self::Deployment => "Deployment",
        }
    }

    pub fn api_version(&self) -> &'static str {
        match self {
            Self::Service | Self::ServiceAccount | Self::ConfigMap => "v1",
            Self::ClusterRole | Self::ClusterRoleBinding | Self::Role | Self::RoleBinding => {
                "rbac.authorization.k8s.io/v1"
            }
            Self::StatefulSet | Self::Deployment => "apps/v1",
        }
    }

    /// Cluster-scoped kinds are keyed without a namespace.
    pub fn is_cluster_scoped(&self) -> bool {
        matches!(self, Self::ClusterRole | Self::ClusterRoleBinding)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Service" => Ok(Self::Service),
            "ServiceAccount" => Ok(Self::ServiceAccount),
            "ClusterRole" => Ok(Self::ClusterRole),
            "ClusterRoleBinding" => Ok(Self::ClusterRoleBinding),
            "Role" => Ok(Self::Role),
            "RoleBinding" => Ok(Self::RoleBinding),
            "StatefulSet" => Ok(Self::StatefulSet),
            "ConfigMap" => Ok(Self::ConfigMap),
            "Deployment" => Ok(Self::Deployment),
            _ => Err(format!("Unknown resource kind: {}", s)),
        }
    }
}

/// Store lookup key: (kind, name, namespace).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub kind: ResourceKind,
    pub name: String,
    /// `None` for cluster-scoped kinds
    pub namespace: Option<String>,
}

impl ObjectKey {
    /// Build a key, dropping the namespace for cluster-scoped kinds.
    pub fn new(kind: ResourceKind, name: impl Into<String>, namespace: &str) -> Self {
        Self {
            kind,
            name: name.into(),
            namespace: if kind.is_cluster_scoped() {
                None
            } else {
                Some(namespace.to_string())
            },
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.kind, ns, self.name),
            None => write!(f, "{} {}", self.kind, self.name),
        }
    }
}

/// Parent link used for cascading deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
    pub controller: bool,
    pub block_owner_deletion: bool,
}

impl OwnerReference {
    /// Controller reference back to a workflow instance. The instance must
    /// have been assigned a uid.
    pub fn for_workflow(instance: &WorkflowInstance) -> Result<Self> {
        let uid = instance.metadata.uid.clone().ok_or_else(|| {
            Error::Validation(format!(
                "Workflow '{}' has no uid; owned objects cannot reference it",
                instance.metadata.name
            ))
        })?;
        Ok(Self {
            api_version: instance.api_version.clone(),
            kind: instance.kind.clone(),
            name: instance.metadata.name.clone(),
            uid,
            controller: true,
            block_owner_deletion: true,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,

    /// Assigned by the store on create
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,

    /// Assigned by the store on create
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    /// Metadata for a namespaced object.
    pub fn namespaced(name: impl Into<String>, namespace: &str) -> Self {
        Self {
            name: name.into(),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        }
    }

    /// Metadata for a cluster-scoped object.
    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    /// "None" makes the service headless
    #[serde(rename = "clusterIP")]
    pub cluster_ip: String,
    pub selector: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub metadata: ObjectMeta,
    pub spec: ServiceSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceAccount {
    pub metadata: ObjectMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRule {
    pub api_groups: Vec<String>,
    pub resources: Vec<String>,
    pub verbs: Vec<String>,
}

impl PolicyRule {
    pub fn new(api_groups: &[&str], resources: &[&str], verbs: &[&str]) -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            api_groups: owned(api_groups),
            resources: owned(resources),
            verbs: owned(verbs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRole {
    pub metadata: ObjectMeta,
    pub rules: Vec<PolicyRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub metadata: ObjectMeta,
    pub rules: Vec<PolicyRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub kind: String,
    pub name: String,
    pub namespace: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRef {
    pub api_group: String,
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRoleBinding {
    pub metadata: ObjectMeta,
    pub subjects: Vec<Subject>,
    pub role_ref: RoleRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleBinding {
    pub metadata: ObjectMeta,
    pub subjects: Vec<Subject>,
    pub role_ref: RoleRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub name: String,
    pub image: String,
    pub image_pull_policy: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigMapVolumeSource {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub name: String,
    pub config_map: ConfigMapVolumeSource,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,

    /// Unset for replica sets, whose pods are named by ordinal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub subdomain: String,
    pub containers: Vec<Container>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodTemplate {
    pub labels: BTreeMap<String, String>,
    pub spec: PodSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatefulSetSpec {
    /// Headless service giving replicas their stable names
    pub service_name: String,
    pub replicas: u32,
    pub selector: BTreeMap<String, String>,
    pub template: PodTemplate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatefulSet {
    pub metadata: ObjectMeta,
    pub spec: StatefulSetSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigMap {
    pub metadata: ObjectMeta,
    pub data: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentSpec {
    pub replicas: u32,
    pub selector: BTreeMap<String, String>,
    pub template: PodTemplate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub metadata: ObjectMeta,
    pub spec: DeploymentSpec,
}

/// Any managed object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Resource {
    Service(Service),
    ServiceAccount(ServiceAccount),
    ClusterRole(ClusterRole),
    ClusterRoleBinding(ClusterRoleBinding),
    Role(Role),
    RoleBinding(RoleBinding),
    StatefulSet(StatefulSet),
    ConfigMap(ConfigMap),
    Deployment(Deployment),
}

impl Resource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Service(_) => ResourceKind::Service,
            Self::ServiceAccount(_) => ResourceKind::ServiceAccount,
            Self::ClusterRole(_) => ResourceKind::ClusterRole,
            Self::ClusterRoleBinding(_) => ResourceKind::ClusterRoleBinding,
            Self::Role(_) => ResourceKind::Role,
            Self::RoleBinding(_) => ResourceKind::RoleBinding,
            Self::StatefulSet(_) => ResourceKind::StatefulSet,
            Self::ConfigMap(_) => ResourceKind::ConfigMap,
            Self::Deployment(_) => ResourceKind::Deployment,
        }
    }

    pub fn meta(&self) -> &ObjectMeta {
        match self {
            Self::Service(r) => &r.metadata,
            Self::ServiceAccount(r) => &r.metadata,
            Self::ClusterRole(r) => &r.metadata,
            Self::ClusterRoleBinding(r) => &r.metadata,
            Self::Role(r) => &r.metadata,
            Self::RoleBinding(r) => &r.metadata,
            Self::StatefulSet(r) => &r.metadata,
            Self::ConfigMap(r) => &r.metadata,
            Self::Deployment(r) => &r.metadata,
        }
    }

    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Self::Service(r) => &mut r.metadata,
            Self::ServiceAccount(r) => &mut r.metadata,
            Self::ClusterRole(r) => &mut r.metadata,
            Self::ClusterRoleBinding(r) => &mut r.metadata,
            Self::Role(r) => &mut r.metadata,
            Self::RoleBinding(r) => &mut r.metadata,
            Self::StatefulSet(r) => &mut r.metadata,
            Self::ConfigMap(r) => &mut r.metadata,
            Self::Deployment(r) => &mut r.metadata,
        }
    }

    pub fn key(&self) -> ObjectKey {
        let meta = self.meta();
        ObjectKey {
            kind: self.kind(),
            name: meta.name.clone(),
            namespace: meta.namespace.clone(),
        }
    }

    /// Manifest form with `apiVersion` and `kind`.
    pub fn to_manifest(&self) -> Result<serde_json::Value> {
        let mut value = serde_json::to_value(self)?;
        if let Some(map) = value.as_object_mut() {
            map.insert(
                "apiVersion".to_string(),
                serde_json::Value::String(self.kind().api_version().to_string()),
            );
        }
        Ok(value)
    }
}

/// Record `owner` as the controlling owner of `resource`.
///
/// Idempotent: an existing reference with the same uid is replaced, not
/// duplicated.
pub fn set_owner_reference(owner: &OwnerReference, resource: &mut Resource) {
    let refs = &mut resource.meta_mut().owner_references;
    refs.retain(|r| r.uid != owner.uid);
    refs.push(owner.clone());
}
