use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;

use crate::error::{ExchangeError, Result};

/// Descriptor file every installed unit carries at its root
pub const COMPONENT_JSON: &str = "component.json";

/// Version placeholder asking the resolver for the latest compatible release
pub const ANY_VERSION: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentType {
    Composite,
    Pack,
    Reference,
    Resource,
    #[serde(other)]
    Other,
}

/// Contents of a `component.json` descriptor file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentJson {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pack: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub component_type: Option<ComponentType>,
    /// External package a reference component stands for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl ComponentJson {
    /// Read the descriptor inside `dir`, `None` when the directory has none
    pub async fn read_from_dir(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(COMPONENT_JSON);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| ExchangeError::io("read component descriptor", &path, e))?;
        let json = serde_json::from_str(&content)
            .map_err(|source| ExchangeError::InvalidJsonFile { path, source })?;
        Ok(Some(json))
    }

    pub fn is_pack(&self) -> bool {
        self.component_type == Some(ComponentType::Pack)
    }
}

/// Whether `dir` holds a descriptor file
pub async fn has_component_json(dir: &Path) -> bool {
    fs::try_exists(dir.join(COMPONENT_JSON))
        .await
        .unwrap_or(false)
}

/// One installable unit, synthesized per batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentDescriptor {
    pub full_name: String,
    pub name: String,
    pub version: String,
    pub pack: Option<String>,
    pub component_type: Option<ComponentType>,
    pub package: Option<String>,
}

impl ComponentDescriptor {
    pub fn singleton(name: impl Into<String>, version: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            full_name: name.clone(),
            name,
            version: version.into(),
            pack: None,
            component_type: None,
            package: None,
        }
    }

    pub fn pack(name: impl Into<String>, version: impl Into<String>) -> Self {
        let mut descriptor = Self::singleton(name, version);
        descriptor.component_type = Some(ComponentType::Pack);
        descriptor
    }

    pub fn member(pack: &str, member: impl Into<String>, version: impl Into<String>) -> Self {
        let name = member.into();
        Self {
            full_name: member_full_name(pack, &name),
            name,
            version: version.into(),
            pack: Some(pack.to_string()),
            component_type: None,
            package: None,
        }
    }

    pub fn is_pack(&self) -> bool {
        self.component_type == Some(ComponentType::Pack)
    }

    pub fn is_reference(&self) -> bool {
        self.component_type == Some(ComponentType::Reference)
    }

    /// Directory the unit is unpacked into below the components root
    pub fn local_path(&self, components_root: &Path) -> PathBuf {
        match &self.pack {
            Some(pack) => components_root.join(pack).join(&self.name),
            None => components_root.join(&self.name),
        }
    }

    /// Copy `type` and reference package from a freshly unpacked descriptor file
    pub fn enrich(&mut self, json: &ComponentJson) {
        if json.component_type.is_some() {
            self.component_type = json.component_type;
        }
        if json.package.is_some() {
            self.package = json.package.clone();
        }
    }
}

impl fmt::Display for ComponentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.full_name, self.version)
    }
}

/// Reject names that would point outside the components root once joined onto it
pub fn validate_unit_name(name: &str) -> Result<()> {
    let invalid = name.trim().is_empty()
        || name == "."
        || name.contains("..")
        || name.contains(['/', '\\', ':']);
    if invalid {
        return Err(ExchangeError::Validation(format!(
            "'{}' is not a valid component name",
            name
        )));
    }
    Ok(())
}

pub fn member_full_name(pack: &str, member: &str) -> String {
    format!("{}-{}", pack, member)
}

/// Pack-shaped entry of a change map, environment or project config
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackEntry {
    pub version: String,
    #[serde(default)]
    pub components: BTreeMap<String, String>,
}

/// Value side of a change map: a plain version or a pack object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChangeEntry {
    Version(String),
    Pack(PackEntry),
}

impl ChangeEntry {
    pub fn version(&self) -> &str {
        match self {
            ChangeEntry::Version(version) => version,
            ChangeEntry::Pack(pack) => &pack.version,
        }
    }
}

pub type ChangeMap = BTreeMap<String, ChangeEntry>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add: Option<ChangeMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove: Option<ChangeMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<ChangeMap>,
}

impl ChangeSet {
    /// Check every unit and pack member name before any of them becomes a path
    pub fn validate_names(&self) -> Result<()> {
        for map in [&self.add, &self.remove, &self.update].into_iter().flatten() {
            for (name, entry) in map {
                validate_unit_name(name)?;
                if let ChangeEntry::Pack(pack) = entry {
                    for member in pack.components.keys() {
                        validate_unit_name(member)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// The resolver's computed diff for one batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Solution {
    #[serde(default)]
    pub environment_changes: ChangeSet,
    #[serde(default)]
    pub config_changes: ChangeSet,
}

/// Changes requested by the caller, `name -> version | "*"`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedChanges {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub add: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub remove: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub update: BTreeMap<String, String>,
}

impl RequestedChanges {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty() && self.update.is_empty()
    }
}

/// Body of `PUT /dependencyResolver`
#[derive(Debug, Clone, Serialize)]
pub struct ResolveRequest<'a> {
    pub config: &'a ChangeMap,
    pub environment: &'a ChangeMap,
    pub changes: &'a RequestedChanges,
}

/// Either a solution or the resolver's "no solution" answer
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ResolverResponse {
    Candidates {
        solutions: Vec<Solution>,
        #[serde(default)]
        message: Option<String>,
    },
    Solved(Solution),
}

impl Solution {
    pub fn validate_names(&self) -> Result<()> {
        self.environment_changes.validate_names()?;
        self.config_changes.validate_names()
    }
}

impl ResolverResponse {
    pub fn into_solution(self) -> Result<Solution> {
        match self {
            ResolverResponse::Solved(solution) => Ok(solution),
            ResolverResponse::Candidates { solutions, message } => {
                solutions.into_iter().next().ok_or_else(|| {
                    ExchangeError::Resolution(message.unwrap_or_else(|| {
                        "The exchange could not find a solution for the requested changes"
                            .to_string()
                    }))
                })
            }
        }
    }
}

/// A caller-side request such as `oj-sample@1.2.0` or `oj-sample`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentRequest {
    pub name: String,
    pub version: Option<String>,
}

impl ComponentRequest {
    pub fn new(name: impl Into<String>, version: Option<String>) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    pub fn version_or_any(&self) -> String {
        self.version.clone().unwrap_or_else(|| ANY_VERSION.to_string())
    }
}

impl FromStr for ComponentRequest {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self> {
        let (name, version) = match s.split_once('@') {
            Some((name, version)) => (name.trim(), Some(version.trim())),
            None => (s.trim(), None),
        };

        validate_unit_name(name)?;

        let version = match version {
            Some("") => {
                return Err(ExchangeError::Validation(format!(
                    "'{}' has an empty version",
                    s
                )));
            }
            Some(version) => Some(version.to_string()),
            None => None,
        };

        Ok(Self::new(name, version))
    }
}

impl fmt::Display for ComponentRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}@{}", self.name, version),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Build-time metadata of a component known to the application build
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentCacheEntry {
    pub component_json: ComponentJson,
    #[serde(default)]
    pub is_local: bool,
    #[serde(default)]
    pub src_path: Option<PathBuf>,
    #[serde(default)]
    pub built_path: Option<PathBuf>,
    #[serde(default)]
    pub import_name: Option<String>,
}
