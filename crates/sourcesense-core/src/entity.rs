//! Hierarchy levels, raw source records and standardized entities
//!
//! Raw records are flat field maps produced by a source adapter. Entities are
//! the typed, standardized values built from them. Parent links are carried as
//! qualified-name strings, never as pointers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Separator used when joining qualified-name components
pub const QUALIFIED_NAME_SEPARATOR: &str = "/";

/// Hierarchy level of a record or entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Database / catalog
    Database,

    /// Schema within a database
    Schema,

    /// Table or view within a schema
    Table,

    /// Column within a table
    Column,

    /// Source-code repository (`owner/repo`)
    Repository,
}

impl Level {
    /// Stable lowercase identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::Schema => "schema",
            Self::Table => "table",
            Self::Column => "column",
            Self::Repository => "repository",
        }
    }

    /// Raw field names holding the qualified-name components, outermost first
    pub fn name_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Database => &["catalog_name"],
            Self::Schema => &["catalog_name", "schema_name"],
            Self::Table => &["table_catalog", "table_schema", "table_name"],
            Self::Column => &["table_catalog", "table_schema", "table_name", "column_name"],
            Self::Repository => &["owner.login", "name"],
        }
    }

    /// Level whose entities own entities of this level
    pub fn parent(&self) -> Option<Level> {
        match self {
            Self::Schema => Some(Self::Database),
            Self::Table => Some(Self::Schema),
            Self::Column => Some(Self::Table),
            Self::Database | Self::Repository => None,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent().is_none()
    }

    /// Position in parent-before-child order
    pub fn depth(&self) -> usize {
        match self.parent() {
            Some(parent) => parent.depth() + 1,
            None => 0,
        }
    }

    /// Number of leading name components naming containers
    ///
    /// The system deny-list is checked against these components only.
    pub fn container_depth(&self) -> usize {
        match self {
            Self::Database | Self::Repository => 1,
            Self::Schema | Self::Table | Self::Column => 2,
        }
    }

    /// Whether include/exclude patterns apply at this level
    pub fn uses_filter_spec(&self) -> bool {
        !matches!(self, Self::Database)
    }

    /// Whether the temporary-table filter applies at this level
    pub fn uses_temp_table_filter(&self) -> bool {
        matches!(self, Self::Table | Self::Column)
    }

    /// Attribute on the parent entity that counts children of this level
    pub fn parent_count_attribute(&self) -> Option<&'static str> {
        match self {
            Self::Schema => Some("schemaCount"),
            Self::Table => Some("tableCount"),
            Self::Column => Some("columnCount"),
            Self::Database | Self::Repository => None,
        }
    }

    pub fn entity_kind(&self) -> EntityKind {
        match self {
            Self::Database => EntityKind::Database,
            Self::Schema => EntityKind::Schema,
            Self::Table => EntityKind::Table,
            Self::Column => EntityKind::Column,
            Self::Repository => EntityKind::Repository,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Type discriminator of a standardized entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Database,
    Schema,
    Table,
    Column,
    Repository,
}

impl EntityKind {
    /// Dataset name used by downstream consumers
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Database => "Database",
            Self::Schema => "Schema",
            Self::Table => "Table",
            Self::Column => "Column",
            Self::Repository => "Repository",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A scalar field value from a source system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ScalarValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Render as a name component; null and empty text are not names
    pub fn as_name(&self) -> Option<String> {
        match self {
            Self::Text(s) if !s.is_empty() => Some(s.clone()),
            Self::Int(i) => Some(i.to_string()),
            _ => None,
        }
    }

    /// Convert a JSON scalar; arrays and objects are not scalars
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(Self::Null),
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => Some(
                n.as_i64()
                    .map(Self::Int)
                    .unwrap_or_else(|| Self::Float(n.as_f64().unwrap_or_default())),
            ),
            serde_json::Value::String(s) => Some(Self::Text(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// A flat record as returned by a source system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Hierarchy level the record describes
    pub level: Level,

    /// Qualified-name components, outermost first
    ///
    /// Shorter than `level.name_fields()` when a name field is absent.
    pub name_parts: Vec<String>,

    /// Source field name to value
    pub fields: BTreeMap<String, ScalarValue>,
}

impl RawRecord {
    /// Build a record, deriving its name components from the level's name fields
    pub fn new(level: Level, fields: BTreeMap<String, ScalarValue>) -> Self {
        let name_parts = level
            .name_fields()
            .iter()
            .map_while(|field| fields.get(*field).and_then(ScalarValue::as_name))
            .collect();

        Self {
            level,
            name_parts,
            fields,
        }
    }

    /// Build a record from `(field, value)` pairs
    pub fn from_pairs<K, V>(level: Level, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<ScalarValue>,
    {
        let fields = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::new(level, fields)
    }

    pub fn field(&self, name: &str) -> Option<&ScalarValue> {
        self.fields.get(name)
    }

    /// First name field that could not be resolved, if any
    pub fn missing_name_field(&self) -> Option<&'static str> {
        self.level.name_fields().get(self.name_parts.len()).copied()
    }

    pub fn local_name(&self) -> Option<&str> {
        if self.missing_name_field().is_some() {
            return None;
        }
        self.name_parts.last().map(String::as_str)
    }

    /// Normalized key the include/exclude patterns are evaluated against
    ///
    /// `catalog.schema` for relational levels below the database, `owner/repo`
    /// for repositories, the catalog name for databases.
    pub fn filter_key(&self) -> Option<String> {
        let depth = self.level.container_depth();
        match self.level {
            Level::Repository => {
                (self.name_parts.len() >= 2).then(|| self.name_parts[..2].join("/"))
            }
            _ => (self.name_parts.len() >= depth).then(|| self.name_parts[..depth].join(".")),
        }
    }

    /// Container name components checked against the system deny-list
    pub fn container_parts(&self) -> &[String] {
        let depth = self.level.container_depth().min(self.name_parts.len());
        &self.name_parts[..depth]
    }

    /// Table name for table and column records
    pub fn table_name(&self) -> Option<&str> {
        match self.level {
            Level::Table | Level::Column => self.name_parts.get(2).map(String::as_str),
            _ => None,
        }
    }
}

/// Identity of the system being scanned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConnection {
    /// Human-readable connection name
    pub connection_name: String,

    /// Globally unique `tenant/app/epoch` string
    pub qualified_name: String,

    /// Reference to the credential used for this connection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_ref: Option<String>,
}

impl SourceConnection {
    pub fn new(connection_name: impl Into<String>, qualified_name: impl Into<String>) -> Self {
        Self {
            connection_name: connection_name.into(),
            qualified_name: qualified_name.into(),
            credential_ref: None,
        }
    }

    pub fn with_credential_ref(mut self, credential_ref: impl Into<String>) -> Self {
        self.credential_ref = Some(credential_ref.into());
        self
    }

    /// Compose the connection qualified name from its scoping parts
    pub fn qualified_name_for(tenant: &str, app: &str, epoch_seconds: i64) -> String {
        format!("{}/{}/{}", tenant, app, epoch_seconds)
    }

    /// Qualified name of the entity named by `parts` under this connection
    pub fn qualified_name_of(&self, parts: &[String]) -> String {
        parts
            .iter()
            .fold(self.qualified_name.clone(), |parent, local| {
                join_qualified_name(&parent, local)
            })
    }
}

/// Child qualified name from its parent's qualified name and its local name
pub fn join_qualified_name(parent: &str, local: &str) -> String {
    format!("{}{}{}", parent, QUALIFIED_NAME_SEPARATOR, local)
}

/// A standardized metadata entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Type discriminator
    #[serde(rename = "typeName")]
    pub kind: EntityKind,

    /// Stable qualified name
    pub qualified_name: String,

    /// Local name
    pub name: String,

    /// Qualified name of the parent entity; `None` for roots
    pub parent_qualified_name: Option<String>,

    /// Standardized attributes
    pub attributes: BTreeMap<String, ScalarValue>,
}

impl Entity {
    pub fn attribute(&self, name: &str) -> Option<&ScalarValue> {
        self.attributes.get(name)
    }

    /// New entity equal to this one with `name` set to `value`
    pub fn with_attribute(&self, name: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        let mut entity = self.clone();
        entity.attributes.insert(name.into(), value.into());
        entity
    }
}
