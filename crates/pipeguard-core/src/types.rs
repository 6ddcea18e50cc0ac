use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Stable node identity: `kind:qualifier[:path]`.
pub type NodeKey = String;

pub type AttrMap = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Package,
    Class,
    Function,
    Component,
    Custom,
}

impl Default for NodeKind {
    fn default() -> Self {
        NodeKind::Custom
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeKind::File => "file",
            NodeKind::Package => "package",
            NodeKind::Class => "class",
            NodeKind::Function => "function",
            NodeKind::Component => "component",
            NodeKind::Custom => "custom",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "file" => Ok(NodeKind::File),
            "package" => Ok(NodeKind::Package),
            "class" => Ok(NodeKind::Class),
            "function" => Ok(NodeKind::Function),
            "component" => Ok(NodeKind::Component),
            "custom" => Ok(NodeKind::Custom),
            other => Err(format!("unknown node kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Import,
    FunctionCall,
    Inheritance,
    Package,
    Custom,
}

impl Default for EdgeKind {
    fn default() -> Self {
        EdgeKind::Custom
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EdgeKind::Import => "import",
            EdgeKind::FunctionCall => "function_call",
            EdgeKind::Inheritance => "inheritance",
            EdgeKind::Package => "package",
            EdgeKind::Custom => "custom",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for EdgeKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "import" => Ok(EdgeKind::Import),
            "function_call" => Ok(EdgeKind::FunctionCall),
            "inheritance" => Ok(EdgeKind::Inheritance),
            "package" => Ok(EdgeKind::Package),
            "custom" => Ok(EdgeKind::Custom),
            other => Err(format!("unknown edge kind: {}", other)),
        }
    }
}

/// Node attributes. Wire field `type` matches the serialized graph format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMeta {
    #[serde(rename = "type", default)]
    pub kind: NodeKind,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub attributes: AttrMap,
}

impl Default for NodeMeta {
    fn default() -> Self {
        Self {
            kind: NodeKind::Custom,
            language: None,
            path: None,
            attributes: AttrMap::new(),
        }
    }
}

impl NodeMeta {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Edge attributes. Wire fields `type` and `is_direct` match the
/// serialized graph format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeMeta {
    #[serde(rename = "type", default)]
    pub kind: EdgeKind,
    #[serde(default = "default_true")]
    pub is_direct: bool,
    #[serde(default)]
    pub attributes: AttrMap,
}

fn default_true() -> bool {
    true
}

impl Default for EdgeMeta {
    fn default() -> Self {
        Self {
            kind: EdgeKind::Custom,
            is_direct: true,
            attributes: AttrMap::new(),
        }
    }
}

impl EdgeMeta {
    pub fn new(kind: EdgeKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    pub fn transitive(mut self) -> Self {
        self.is_direct = false;
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

pub fn file_key(path: &str) -> NodeKey {
    format!("file:{}", path)
}

pub fn package_key(name: &str) -> NodeKey {
    format!("package:{}", name)
}

pub fn function_key(name: &str, defining_file: &str) -> NodeKey {
    format!("function:{}:{}", name, defining_file)
}

pub fn class_key(name: &str, defining_file: &str) -> NodeKey {
    format!("class:{}:{}", name, defining_file)
}

/// The virtual root every package scan hangs direct dependencies off.
pub const PROJECT_PACKAGE_KEY: &str = "package:project";

/// Map a source file extension to its language name.
pub fn language_from_path(path: &str) -> Option<&'static str> {
    let ext = Path::new(path).extension()?.to_str()?;
    match ext {
        "py" => Some("python"),
        "js" | "jsx" => Some("javascript"),
        "ts" | "tsx" => Some("typescript"),
        "java" => Some("java"),
        "go" => Some("go"),
        "rb" => Some("ruby"),
        "rs" => Some("rust"),
        "php" => Some("php"),
        "cs" => Some("csharp"),
        _ => None,
    }
}
