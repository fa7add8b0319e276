//! Record transformer
//!
//! Turns raw records into standardized entities. Parent links are resolved by
//! qualified name against an [`EntityIndex`] holding the entities of every
//! level already completed in this run.

use crate::mapping::{mapping_for, FieldError};
use sourcesense_core::{
    sanitize_text, Diagnostic, DiagnosticCode, Encoding, Entity, Level, RawRecord, ScalarValue,
    Severity, SourceConnection,
};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Status stamped on every entity produced by a run
pub const ACTIVE_STATUS: &str = "ACTIVE";

/// Why a record did not become an entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// A required field or name component is absent
    MissingRequiredField { field: &'static str, entity: String },

    /// A required field holds a value of the wrong kind
    InvalidField {
        field: &'static str,
        value: String,
        entity: String,
    },

    /// The parent entity was not produced in this run
    OrphanedParent { parent: String, entity: String },

    /// Another record of this run already produced the qualified name
    Duplicate { entity: String },
}

impl DropReason {
    pub fn is_orphan(&self) -> bool {
        matches!(self, Self::OrphanedParent { .. })
    }

    pub fn entity(&self) -> &str {
        match self {
            Self::MissingRequiredField { entity, .. }
            | Self::InvalidField { entity, .. }
            | Self::OrphanedParent { entity, .. }
            | Self::Duplicate { entity } => entity,
        }
    }

    /// Record-level diagnostic for this drop
    pub fn diagnostic(&self, level: Level) -> Diagnostic {
        let (code, field) = match self {
            Self::MissingRequiredField { field, .. } => {
                (DiagnosticCode::RecordMissingField, Some(*field))
            }
            Self::InvalidField { field, .. } => (DiagnosticCode::RecordInvalid, Some(*field)),
            Self::OrphanedParent { .. } => (DiagnosticCode::RecordOrphanedParent, None),
            Self::Duplicate { .. } => (DiagnosticCode::RecordInvalid, None),
        };

        let diagnostic = Diagnostic::new(code, Severity::Warn, self.to_string())
            .at_level(level)
            .with_entity(self.entity());
        match field {
            Some(field) => diagnostic.with_field(field),
            None => diagnostic,
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRequiredField { field, entity } => {
                write!(f, "missing required field '{}' on {}", field, entity)
            }
            Self::InvalidField {
                field,
                value,
                entity,
            } => write!(
                f,
                "invalid value '{}' for field '{}' on {}",
                value, field, entity
            ),
            Self::OrphanedParent { parent, entity } => {
                write!(f, "orphaned parent: {} references missing {}", entity, parent)
            }
            Self::Duplicate { entity } => write!(f, "duplicate qualified name {}", entity),
        }
    }
}

/// A successfully transformed record
#[derive(Debug, Clone, PartialEq)]
pub struct Transformed {
    pub entity: Entity,

    /// Text fields that needed character replacement
    pub sanitized_fields: u64,
}

/// Entities of completed levels, keyed by qualified name
///
/// Entities are kept in insertion order, which is parent-before-child when
/// levels are inserted in depth order.
#[derive(Debug, Default)]
pub struct EntityIndex {
    entries: Vec<(Level, Entity)>,
    positions: HashMap<String, usize>,
    child_counts: HashMap<String, i64>,
    levels: BTreeSet<Level>,
}

impl EntityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity; returns `false` if its qualified name is already present
    pub fn insert(&mut self, level: Level, entity: Entity) -> bool {
        if self.positions.contains_key(&entity.qualified_name) {
            return false;
        }
        if let Some(parent) = &entity.parent_qualified_name {
            *self.child_counts.entry(parent.clone()).or_default() += 1;
        }
        self.positions
            .insert(entity.qualified_name.clone(), self.entries.len());
        self.entries.push((level, entity));
        self.levels.insert(level);
        true
    }

    /// Mark `level` as completed even if it produced no entities
    pub fn mark_level(&mut self, level: Level) {
        self.levels.insert(level);
    }

    pub fn contains(&self, qualified_name: &str) -> bool {
        self.positions.contains_key(qualified_name)
    }

    pub fn get(&self, qualified_name: &str) -> Option<&Entity> {
        self.positions
            .get(qualified_name)
            .map(|&i| &self.entries[i].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entities with child-count attributes filled in
    ///
    /// A parent gets a count for every completed child level, zero when it
    /// has no children.
    pub fn finalize(self) -> Vec<Entity> {
        let child_attributes: HashMap<Level, &'static str> = self
            .levels
            .iter()
            .filter_map(|child| Some((child.parent()?, child.parent_count_attribute()?)))
            .collect();

        self.entries
            .into_iter()
            .map(|(level, entity)| match child_attributes.get(&level) {
                Some(attribute) => {
                    let count = self
                        .child_counts
                        .get(&entity.qualified_name)
                        .copied()
                        .unwrap_or(0);
                    entity.with_attribute(*attribute, count)
                }
                None => entity,
            })
            .collect()
    }
}

/// Maps raw records into entities for one run
#[derive(Debug, Clone)]
pub struct RecordTransformer {
    connection: SourceConnection,
    encoding: Encoding,
    workflow_id: String,
    run_id: String,
}

impl RecordTransformer {
    pub fn new(connection: SourceConnection, encoding: Encoding) -> Self {
        Self {
            connection,
            encoding,
            workflow_id: String::new(),
            run_id: String::new(),
        }
    }

    /// Stamp entities with the workflow and run that produced them
    pub fn with_run(mut self, workflow_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        self.workflow_id = workflow_id.into();
        self.run_id = run_id.into();
        self
    }

    pub fn connection(&self) -> &SourceConnection {
        &self.connection
    }

    /// Qualified name of the entity named by `parts`
    ///
    /// Name components are sanitized the same way at every level, so a
    /// child's computed parent name equals the parent's own qualified name.
    pub fn qualified_name(&self, parts: &[String]) -> String {
        let sanitized: Vec<String> = parts
            .iter()
            .map(|part| sanitize_text(part, self.encoding).text.into_owned())
            .collect();
        self.connection.qualified_name_of(&sanitized)
    }

    /// Transform one record, resolving its parent against `index`
    pub fn transform(
        &self,
        record: &RawRecord,
        index: &EntityIndex,
    ) -> Result<Transformed, DropReason> {
        let level = record.level;

        if let Some(field) = record.missing_name_field() {
            return Err(DropReason::MissingRequiredField {
                field,
                entity: self.describe(record),
            });
        }

        let qualified_name = self.qualified_name(&record.name_parts);

        let parent_qualified_name = match level.parent() {
            Some(_) => {
                let parent_parts = &record.name_parts[..record.name_parts.len() - 1];
                let parent = self.qualified_name(parent_parts);
                if !index.contains(&parent) {
                    return Err(DropReason::OrphanedParent {
                        parent,
                        entity: qualified_name,
                    });
                }
                Some(parent)
            }
            None => None,
        };

        let mut sanitized_fields = 0;
        let mut attributes = std::collections::BTreeMap::new();

        for mapping in mapping_for(level) {
            let value = mapping.resolve(record).map_err(|e| match e {
                FieldError::Missing { field } => DropReason::MissingRequiredField {
                    field,
                    entity: qualified_name.clone(),
                },
                FieldError::Invalid { field, value } => DropReason::InvalidField {
                    field,
                    value,
                    entity: qualified_name.clone(),
                },
            })?;

            let value = match value {
                ScalarValue::Text(text) => {
                    let cleaned = sanitize_text(&text, self.encoding);
                    if !cleaned.is_clean() {
                        sanitized_fields += 1;
                    }
                    ScalarValue::Text(cleaned.text.into_owned())
                }
                other => other,
            };
            attributes.insert(mapping.target.to_string(), value);
        }

        let name = record
            .local_name()
            .map(|local| sanitize_text(local, self.encoding))
            .map(|cleaned| {
                if !cleaned.is_clean() {
                    sanitized_fields += 1;
                }
                cleaned.text.into_owned()
            })
            .unwrap_or_default();

        attributes.insert(
            "connectionName".to_string(),
            self.connection.connection_name.clone().into(),
        );
        attributes.insert(
            "connectionQualifiedName".to_string(),
            self.connection.qualified_name.clone().into(),
        );
        attributes.insert(
            "lastSyncWorkflowName".to_string(),
            self.workflow_id.clone().into(),
        );
        attributes.insert("lastSyncRunId".to_string(), self.run_id.clone().into());
        attributes.insert("status".to_string(), ACTIVE_STATUS.into());

        Ok(Transformed {
            entity: Entity {
                kind: level.entity_kind(),
                qualified_name,
                name,
                parent_qualified_name,
                attributes,
            },
            sanitized_fields,
        })
    }

    /// Best identity for a record whose name is incomplete
    fn describe(&self, record: &RawRecord) -> String {
        format!("{} {}", record.level, self.qualified_name(&record.name_parts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn transformer() -> RecordTransformer {
        RecordTransformer::new(
            SourceConnection::new("warehouse", "default/sourcesense/1700000000"),
            Encoding::Ascii,
        )
        .with_run("wf-1", "42")
    }

    fn schema(catalog: &str, schema: &str) -> RawRecord {
        RawRecord::from_pairs(
            Level::Schema,
            [("catalog_name", catalog), ("schema_name", schema)],
        )
    }

    fn table(catalog: &str, schema: &str, table: &str) -> RawRecord {
        RawRecord::from_pairs(
            Level::Table,
            [
                ("table_catalog", catalog),
                ("table_schema", schema),
                ("table_name", table),
            ],
        )
    }

    fn index_with(records: &[RawRecord]) -> EntityIndex {
        let t = transformer();
        let mut index = EntityIndex::new();
        for record in records {
            let entity = t.transform(record, &index).unwrap().entity;
            assert!(index.insert(record.level, entity));
        }
        index
    }

    #[test]
    fn qualified_names_chain_from_connection() {
        let t = transformer();
        let index = index_with(&[RawRecord::from_pairs(
            Level::Database,
            [("catalog_name", "app")],
        )]);

        let out = t.transform(&schema("app", "Users"), &index).unwrap();
        assert_eq!(
            out.entity.qualified_name,
            "default/sourcesense/1700000000/app/Users"
        );
        assert_eq!(
            out.entity.parent_qualified_name.as_deref(),
            Some("default/sourcesense/1700000000/app")
        );
        assert_eq!(out.entity.name, "Users");
        assert_eq!(
            out.entity.attribute("status"),
            Some(&ScalarValue::from(ACTIVE_STATUS))
        );
        assert_eq!(
            out.entity.attribute("lastSyncRunId"),
            Some(&ScalarValue::from("42"))
        );
    }

    #[test]
    fn transform_is_deterministic() {
        let t = transformer();
        let index = index_with(&[
            RawRecord::from_pairs(Level::Database, [("catalog_name", "app")]),
            schema("app", "users"),
        ]);

        let first = t.transform(&table("app", "users", "accounts"), &index).unwrap();
        let second = t.transform(&table("app", "users", "accounts"), &index).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_parent_is_orphaned() {
        let t = transformer();
        let index = index_with(&[
            RawRecord::from_pairs(Level::Database, [("catalog_name", "app")]),
            schema("app", "users"),
        ]);

        let reason = t
            .transform(&table("app", "missing_db", "accounts"), &index)
            .unwrap_err();
        assert!(reason.is_orphan());
        assert!(reason.to_string().starts_with("orphaned parent"));
        assert_eq!(
            reason.diagnostic(Level::Table).code,
            DiagnosticCode::RecordOrphanedParent
        );
    }

    #[test]
    fn missing_name_component_is_reported() {
        let t = transformer();
        let record = RawRecord::from_pairs(Level::Schema, [("catalog_name", "app")]);

        let reason = t.transform(&record, &EntityIndex::new()).unwrap_err();
        assert!(matches!(
            reason,
            DropReason::MissingRequiredField {
                field: "schema_name",
                ..
            }
        ));
    }

    #[test]
    fn text_is_sanitized_not_rejected() {
        let t = transformer();
        let record = RawRecord::from_pairs(
            Level::Repository,
            [
                ("owner.login", "octocat"),
                ("name", "hello-world"),
                ("description", "caf\u{e9} \u{1F600}"),
            ],
        );

        let out = t.transform(&record, &EntityIndex::new()).unwrap();
        assert_eq!(out.sanitized_fields, 1);
        assert_eq!(
            out.entity.attribute("description"),
            Some(&ScalarValue::from("caf? ?"))
        );
        assert_eq!(out.entity.parent_qualified_name, None);
    }

    #[test]
    fn finalize_counts_children() {
        let mut index = index_with(&[
            RawRecord::from_pairs(Level::Database, [("catalog_name", "app")]),
            schema("app", "users"),
            schema("app", "orders"),
            table("app", "users", "accounts"),
        ]);
        index.mark_level(Level::Table);

        let entities = index.finalize();
        let count = |qn: &str, attr: &str| {
            entities
                .iter()
                .find(|e| e.qualified_name.ends_with(qn))
                .and_then(|e| e.attribute(attr).cloned())
        };

        assert_eq!(count("/app", "schemaCount"), Some(ScalarValue::Int(2)));
        assert_eq!(count("/app/users", "tableCount"), Some(ScalarValue::Int(1)));
        assert_eq!(count("/app/orders", "tableCount"), Some(ScalarValue::Int(0)));
        assert_eq!(count("/app/users/accounts", "columnCount"), None);
    }

    #[test]
    fn duplicate_qualified_names_are_refused() {
        let t = transformer();
        let mut index = EntityIndex::new();
        let record = RawRecord::from_pairs(Level::Database, [("catalog_name", "app")]);

        let first = t.transform(&record, &index).unwrap().entity;
        assert!(index.insert(Level::Database, first.clone()));
        assert!(!index.insert(Level::Database, first));
        assert_eq!(index.len(), 1);
    }
}
