//! Include/exclude filter engine
//!
//! Patterns are regular expressions matched against a record's normalized key
//! (`catalog.schema` or `owner/repo`). Matching is always anchored: a pattern
//! matches when it matches the whole key or a whole trailing component of it,
//! so `temp_.*` matches `app.temp_201` but not `app.my_temp_201`.
//!
//! Evaluation order is fixed:
//! 1. System containers (see [`SYSTEM_CONTAINERS`]) are rejected unconditionally.
//! 2. The exclude pattern is checked first and always wins.
//! 3. The include pattern decides; an empty include matches everything.
//! 4. At table and column level the temporary-table pattern is an extra
//!    exclude applied to the table name.

use crate::entity::RawRecord;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Container names that are never extracted, whatever the filter says
pub const SYSTEM_CONTAINERS: &[&str] = &[
    "information_schema",
    "pg_catalog",
    "pg_toast",
    "pg_internal",
    "sys",
    "performance_schema",
    "mysql",
];

/// Which pattern of a [`FilterSpec`] an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternRole {
    Include,
    Exclude,
    TempTable,
}

impl fmt::Display for PatternRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Include => write!(f, "include"),
            Self::Exclude => write!(f, "exclude"),
            Self::TempTable => write!(f, "temp-table"),
        }
    }
}

/// Filter compilation errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum FilterError {
    #[error("Invalid {role} pattern '{pattern}': {message}")]
    InvalidPattern {
        role: PatternRole,
        pattern: String,
        message: String,
    },
}

/// Include/exclude rules as supplied at run start
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    /// Include pattern; empty matches everything
    #[serde(default)]
    pub include: String,

    /// Exclude pattern; empty matches nothing
    #[serde(default)]
    pub exclude: String,

    /// Table-name pattern for temporary tables; empty disables the check
    #[serde(default)]
    pub temp_table: String,
}

impl FilterSpec {
    pub fn new(include: impl Into<String>, exclude: impl Into<String>) -> Self {
        Self {
            include: include.into(),
            exclude: exclude.into(),
            temp_table: String::new(),
        }
    }

    pub fn with_temp_table(mut self, pattern: impl Into<String>) -> Self {
        self.temp_table = pattern.into();
        self
    }

    /// Compile all patterns, failing closed on the first malformed one
    pub fn compile(&self) -> Result<CompiledFilter, FilterError> {
        Ok(CompiledFilter {
            exclude: compile_pattern(PatternRole::Exclude, &self.exclude)?,
            include: compile_pattern(PatternRole::Include, &self.include)?,
            temp_table: compile_pattern(PatternRole::TempTable, &self.temp_table)?,
            spec: self.clone(),
        })
    }
}

/// Evaluate `spec` against a single qualified name
pub fn matches(qualified_name: &str, spec: &FilterSpec) -> Result<bool, FilterError> {
    Ok(spec.compile()?.matches(qualified_name))
}

/// Outcome of evaluating a record against a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Admit,
    SystemContainer,
    Excluded,
    NotIncluded,
    TemporaryTable,
}

impl FilterDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admit)
    }
}

/// A [`FilterSpec`] with its patterns compiled
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    include: Option<Regex>,
    exclude: Option<Regex>,
    temp_table: Option<Regex>,
    spec: FilterSpec,
}

impl CompiledFilter {
    /// Filter that admits everything except system containers
    pub fn allow_all() -> Self {
        Self {
            include: None,
            exclude: None,
            temp_table: None,
            spec: FilterSpec::default(),
        }
    }

    pub fn spec(&self) -> &FilterSpec {
        &self.spec
    }

    /// Apply the include/exclude patterns to a normalized key
    pub fn matches(&self, key: &str) -> bool {
        if let Some(exclude) = &self.exclude {
            if matches_key(exclude, key) {
                return false;
            }
        }
        self.include.as_ref().map_or(true, |include| matches_key(include, key))
    }

    /// Full decision for a raw record at its level
    ///
    /// Records whose name is incomplete are admitted so the transformer can
    /// report the missing field.
    pub fn evaluate(&self, record: &RawRecord) -> FilterDecision {
        if record.container_parts().iter().any(|part| is_system_container(part)) {
            return FilterDecision::SystemContainer;
        }

        if record.level.uses_filter_spec() {
            if let Some(key) = record.filter_key() {
                if let Some(exclude) = &self.exclude {
                    if matches_key(exclude, &key) {
                        return FilterDecision::Excluded;
                    }
                }
                if let Some(include) = &self.include {
                    if !matches_key(include, &key) {
                        return FilterDecision::NotIncluded;
                    }
                }
            }
        }

        if record.level.uses_temp_table_filter() {
            if let (Some(temp), Some(table)) = (&self.temp_table, record.table_name()) {
                if temp.is_match(table) {
                    return FilterDecision::TemporaryTable;
                }
            }
        }

        FilterDecision::Admit
    }

    pub fn admits(&self, record: &RawRecord) -> bool {
        self.evaluate(record).is_admitted()
    }

    /// Anchored include regex for source-side pushdown
    pub fn normalized_include_regex(&self) -> String {
        normalize(&self.spec.include).unwrap_or_else(|| ".*".to_string())
    }

    /// Anchored exclude regex for source-side pushdown; matches no real name when empty
    pub fn normalized_exclude_regex(&self) -> String {
        normalize(&self.spec.exclude).unwrap_or_else(|| "^$".to_string())
    }

    /// Anchored temporary-table regex, if configured
    pub fn normalized_temp_table_regex(&self) -> Option<String> {
        normalize(&self.spec.temp_table)
    }
}

/// Case-insensitive membership in the system deny-list
pub fn is_system_container(name: &str) -> bool {
    SYSTEM_CONTAINERS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name))
}

fn normalize(pattern: &str) -> Option<String> {
    let pattern = pattern.trim();
    (!pattern.is_empty()).then(|| format!("^(?:{})$", pattern))
}

fn compile_pattern(role: PatternRole, pattern: &str) -> Result<Option<Regex>, FilterError> {
    let Some(normalized) = normalize(pattern) else {
        return Ok(None);
    };
    Regex::new(&normalized)
        .map(Some)
        .map_err(|e| FilterError::InvalidPattern {
            role,
            pattern: pattern.to_string(),
            message: e.to_string(),
        })
}

/// Anchored match against the key or any trailing component-aligned suffix
fn matches_key(pattern: &Regex, key: &str) -> bool {
    std::iter::once(key)
        .chain(key.match_indices(['.', '/']).map(|(idx, _)| &key[idx + 1..]))
        .any(|candidate| pattern.is_match(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Level;

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

    #[test]
    fn exclude_always_wins() {
        let filter = FilterSpec::new("app\\..*", "app\\.users").compile().unwrap();
        assert!(!filter.matches("app.users"));
        assert!(filter.matches("app.orders"));

        let filter = FilterSpec::new(".*", ".*").compile().unwrap();
        assert!(!filter.matches("anything.at_all"));
    }

    #[test]
    fn empty_patterns() {
        let filter = FilterSpec::default().compile().unwrap();
        assert!(filter.matches("app.users"));
        assert_eq!(filter.normalized_include_regex(), ".*");
        assert_eq!(filter.normalized_exclude_regex(), "^$");
    }

    #[test]
    fn anchored_not_substring() {
        let filter = FilterSpec::new("app", "").compile().unwrap();
        assert!(filter.matches("app"));
        assert!(!filter.matches("application.users"));

        let filter = FilterSpec::new("", "temp_.*").compile().unwrap();
        assert!(!filter.matches("app.temp_201"));
        assert!(filter.matches("app.my_temp_201"));
    }

    #[test]
    fn malformed_pattern_fails_closed() {
        let err = FilterSpec::new("", "temp_(").compile().unwrap_err();
        match err {
            FilterError::InvalidPattern { role, pattern, .. } => {
                assert_eq!(role, PatternRole::Exclude);
                assert_eq!(pattern, "temp_(");
            }
        }
        assert!(matches("app.users", &FilterSpec::new("[", "")).is_err());
    }

    #[test]
    fn example_schema_scenario() {
        let filter = FilterSpec::new("app\\..*", "temp_.*").compile().unwrap();
        let records = [
            schema("app", "users"),
            schema("app", "temp_201"),
            schema("sys", "internal"),
        ];
        let surviving: Vec<String> = records
            .iter()
            .filter(|r| filter.admits(r))
            .filter_map(|r| r.filter_key())
            .collect();
        assert_eq!(surviving, vec!["app.users".to_string()]);
        assert_eq!(filter.evaluate(&records[2]), FilterDecision::SystemContainer);
        assert_eq!(filter.evaluate(&records[1]), FilterDecision::Excluded);
    }

    #[test]
    fn system_containers_ignore_filter_spec() {
        let filter = FilterSpec::new(".*", "").compile().unwrap();
        assert!(!filter.admits(&schema("app", "information_schema")));
        assert!(!filter.admits(&schema("app", "PG_CATALOG")));
        assert!(!filter.admits(&RawRecord::from_pairs(
            Level::Database,
            [("catalog_name", "sys")]
        )));
    }

    #[test]
    fn database_level_ignores_include() {
        let filter = FilterSpec::new("app\\..*", "").compile().unwrap();
        let db = RawRecord::from_pairs(Level::Database, [("catalog_name", "app")]);
        assert!(filter.admits(&db));
    }

    #[test]
    fn temp_table_filter_is_additional_exclude() {
        let filter = FilterSpec::new("app\\..*", "")
            .with_temp_table("tmp_.*")
            .compile()
            .unwrap();
        assert!(filter.admits(&table("app", "users", "accounts")));
        assert_eq!(
            filter.evaluate(&table("app", "users", "tmp_accounts")),
            FilterDecision::TemporaryTable
        );
        // Primary result still applies
        assert_eq!(
            filter.evaluate(&table("other", "users", "accounts")),
            FilterDecision::NotIncluded
        );
        // Temp-table pattern never touches schema records
        assert!(filter.admits(&schema("app", "tmp_schema")));
    }

    #[test]
    fn repository_keys() {
        let filter = FilterSpec::new("octo/.*", "octo/archived-.*").compile().unwrap();
        let repo = |name: &str| {
            RawRecord::from_pairs(Level::Repository, [("owner.login", "octo"), ("name", name)])
        };
        assert!(filter.admits(&repo("hello")));
        assert!(!filter.admits(&repo("archived-site")));
    }
}
