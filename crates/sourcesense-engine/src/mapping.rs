//! Per-level field mappings from raw source fields to entity attributes
//!
//! Each level declares which raw fields it reads, the attribute they land in,
//! the value kind, and what happens when the field is absent: required fields
//! drop the record, all others fall back to a documented default.

use sourcesense_core::{Level, RawRecord, ScalarValue};

/// Value kind of a mapped attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Boolean,
}

/// Value used when an optional field is absent or null
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldDefault {
    Null,
    Int(i64),
    Bool(bool),
    Text(&'static str),
}

impl FieldDefault {
    pub fn value(&self) -> ScalarValue {
        match self {
            Self::Null => ScalarValue::Null,
            Self::Int(i) => ScalarValue::Int(*i),
            Self::Bool(b) => ScalarValue::Bool(*b),
            Self::Text(s) => ScalarValue::Text((*s).to_string()),
        }
    }
}

/// Why a field could not be mapped
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("missing required field '{field}'")]
    Missing { field: &'static str },

    #[error("invalid value '{value}' for field '{field}'")]
    Invalid { field: &'static str, value: String },
}

impl FieldError {
    pub fn field(&self) -> &'static str {
        match self {
            Self::Missing { field } | Self::Invalid { field, .. } => field,
        }
    }
}

/// One raw field to attribute mapping
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldMapping {
    /// Raw field name (flattened keys use dots)
    pub source: &'static str,

    /// Attribute name on the entity
    pub target: &'static str,

    pub kind: FieldKind,
    pub required: bool,
    pub default: FieldDefault,
}

impl FieldMapping {
    const fn new(source: &'static str, target: &'static str, kind: FieldKind) -> Self {
        Self {
            source,
            target,
            kind,
            required: false,
            default: FieldDefault::Null,
        }
    }

    const fn text(source: &'static str, target: &'static str) -> Self {
        Self::new(source, target, FieldKind::Text)
    }

    const fn integer(source: &'static str, target: &'static str) -> Self {
        Self::new(source, target, FieldKind::Integer)
    }

    const fn boolean(source: &'static str, target: &'static str) -> Self {
        Self::new(source, target, FieldKind::Boolean)
    }

    const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    const fn or(mut self, default: FieldDefault) -> Self {
        self.default = default;
        self
    }

    /// Resolve this mapping against `record`
    ///
    /// Optional fields that are absent, null, or not convertible take the
    /// default; required ones fail.
    pub fn resolve(&self, record: &RawRecord) -> Result<ScalarValue, FieldError> {
        let raw = record.field(self.source).filter(|v| !v.is_null());

        let Some(raw) = raw else {
            if self.required {
                return Err(FieldError::Missing { field: self.source });
            }
            return Ok(self.default.value());
        };

        match convert(raw, self.kind) {
            Some(value) => Ok(value),
            None if self.required => Err(FieldError::Invalid {
                field: self.source,
                value: raw.to_string(),
            }),
            None => {
                tracing::debug!(
                    field = self.source,
                    value = %raw,
                    "unconvertible optional field, using default"
                );
                Ok(self.default.value())
            }
        }
    }
}

fn convert(value: &ScalarValue, kind: FieldKind) -> Option<ScalarValue> {
    match (kind, value) {
        (FieldKind::Text, ScalarValue::Text(s)) => Some(ScalarValue::Text(s.clone())),
        (FieldKind::Text, other) => Some(ScalarValue::Text(other.to_string())),

        (FieldKind::Integer, ScalarValue::Int(i)) => Some(ScalarValue::Int(*i)),
        (FieldKind::Integer, ScalarValue::Float(x)) if x.fract() == 0.0 => {
            Some(ScalarValue::Int(*x as i64))
        }
        (FieldKind::Integer, ScalarValue::Text(s)) => s.trim().parse().ok().map(ScalarValue::Int),
        (FieldKind::Integer, _) => None,

        (FieldKind::Boolean, ScalarValue::Bool(b)) => Some(ScalarValue::Bool(*b)),
        (FieldKind::Boolean, ScalarValue::Int(i)) => Some(ScalarValue::Bool(*i != 0)),
        (FieldKind::Boolean, ScalarValue::Text(s)) => parse_bool(s).map(ScalarValue::Bool),
        (FieldKind::Boolean, _) => None,
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "t" | "1" => Some(true),
        "false" | "no" | "n" | "f" | "0" => Some(false),
        _ => None,
    }
}

const DATABASE: &[FieldMapping] = &[FieldMapping::text("catalog_name", "databaseName").required()];

const SCHEMA: &[FieldMapping] = &[
    FieldMapping::text("catalog_name", "databaseName").required(),
    FieldMapping::text("schema_name", "schemaName").required(),
    FieldMapping::text("schema_owner", "owner"),
];

const TABLE: &[FieldMapping] = &[
    FieldMapping::text("table_catalog", "databaseName").required(),
    FieldMapping::text("table_schema", "schemaName").required(),
    FieldMapping::text("table_type", "tableType").or(FieldDefault::Text("BASE TABLE")),
    FieldMapping::text("remarks", "description"),
];

const COLUMN: &[FieldMapping] = &[
    FieldMapping::text("table_catalog", "databaseName").required(),
    FieldMapping::text("table_schema", "schemaName").required(),
    FieldMapping::text("table_name", "tableName").required(),
    FieldMapping::text("data_type", "dataType").required(),
    FieldMapping::boolean("is_nullable", "isNullable").or(FieldDefault::Bool(true)),
    FieldMapping::integer("ordinal_position", "order"),
    FieldMapping::text("column_default", "defaultValue"),
    FieldMapping::integer("character_maximum_length", "maxLength"),
    FieldMapping::integer("numeric_precision", "precision"),
    FieldMapping::integer("numeric_scale", "scale"),
];

const REPOSITORY: &[FieldMapping] = &[
    FieldMapping::text("name", "name").required(),
    FieldMapping::text("owner.login", "ownerLogin").required(),
    FieldMapping::text("full_name", "fullName"),
    FieldMapping::text("description", "description"),
    FieldMapping::text("html_url", "sourceUrl"),
    FieldMapping::boolean("private", "isPrivate").or(FieldDefault::Bool(false)),
    FieldMapping::boolean("fork", "isFork").or(FieldDefault::Bool(false)),
    FieldMapping::integer("stargazers_count", "stargazersCount").or(FieldDefault::Int(0)),
    FieldMapping::integer("watchers_count", "watchersCount").or(FieldDefault::Int(0)),
    FieldMapping::integer("forks_count", "forksCount").or(FieldDefault::Int(0)),
    FieldMapping::integer("open_issues_count", "openIssuesCount").or(FieldDefault::Int(0)),
    FieldMapping::text("language", "language"),
];

/// Declared field mapping for entities of `level`
pub fn mapping_for(level: Level) -> &'static [FieldMapping] {
    match level {
        Level::Database => DATABASE,
        Level::Schema => SCHEMA,
        Level::Table => TABLE,
        Level::Column => COLUMN,
        Level::Repository => REPOSITORY,
    }
}
