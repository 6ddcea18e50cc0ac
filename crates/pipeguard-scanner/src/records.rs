use pipeguard_core::{AttrMap, NodeKey};
use serde::{Deserialize, Serialize};

/// How a module was pulled in at the syntax level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportKind {
    Absolute,
    Relative,
    From,
    Require,
    Default,
    Named,
    SideEffect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRecord {
    /// Module name as written (`os.path`, `./utils`, `react`).
    pub name: String,
    #[serde(default)]
    pub alias: Option<String>,
    pub kind: ImportKind,
    /// Project-relative path of the resolved module file, when the
    /// import points inside the project.
    #[serde(default)]
    pub resolved: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    Function,
    Method,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub name: String,
    pub kind: CallKind,
    /// Receiver for method calls (`obj` in `obj.run()`).
    #[serde(default)]
    pub object: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassRecord {
    pub name: String,
    #[serde(default)]
    pub parents: Vec<String>,
}

/// Everything one language scanner extracted from one source file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileScan {
    /// Project-relative path.
    pub path: String,
    pub language: Option<String>,
    #[serde(default)]
    pub imports: Vec<ImportRecord>,
    #[serde(default)]
    pub calls: Vec<CallRecord>,
    #[serde(default)]
    pub classes: Vec<ClassRecord>,
    /// Names of functions defined in this file, used to resolve call
    /// targets during assembly.
    #[serde(default)]
    pub functions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodeScan {
    pub files: Vec<FileScan>,
    /// Files that failed to read or parse; the batch never aborts.
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageManager {
    Pip,
    Npm,
    Maven,
    Gradle,
    Cargo,
    Go,
    Bundler,
    Composer,
    Nuget,
}

impl PackageManager {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageManager::Pip => "pip",
            PackageManager::Npm => "npm",
            PackageManager::Maven => "maven",
            PackageManager::Gradle => "gradle",
            PackageManager::Cargo => "cargo",
            PackageManager::Go => "go",
            PackageManager::Bundler => "bundler",
            PackageManager::Composer => "composer",
            PackageManager::Nuget => "nuget",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyScope {
    Direct,
    Transitive,
    Dev,
}

/// Pre-graph package node record (`package:<name>` or
/// `package:<group>:<artifact>`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageNodeRecord {
    pub key: NodeKey,
    #[serde(default)]
    pub attributes: AttrMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageEdgeRecord {
    pub source: NodeKey,
    pub target: NodeKey,
    pub scope: DependencyScope,
    #[serde(default)]
    pub version: Option<String>,
    /// Manifest file the dependency was declared in, when known.
    #[serde(default)]
    pub declared_in: Option<String>,
}

/// Output of one package-manager scan. A virtual `package:project` root
/// is always present and linked to each direct dependency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageRecords {
    pub manager: PackageManager,
    pub nodes: Vec<PackageNodeRecord>,
    pub edges: Vec<PackageEdgeRecord>,
}

impl PackageRecords {
    pub fn new(manager: PackageManager) -> Self {
        Self {
            manager,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Insert a node, replacing any record with the same key.
    pub fn upsert_node(&mut self, record: PackageNodeRecord) {
        if let Some(existing) = self.nodes.iter_mut().find(|n| n.key == record.key) {
            *existing = record;
        } else {
            self.nodes.push(record);
        }
    }

    pub fn push_edge(&mut self, record: PackageEdgeRecord) {
        let duplicate = self
            .edges
            .iter()
            .any(|e| e.source == record.source && e.target == record.target);
        if !duplicate {
            self.edges.push(record);
        }
    }
}
