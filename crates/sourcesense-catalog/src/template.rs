//! Query templates with escaped filter placeholders
//!
//! Templates are rendered with minijinja. Placeholder values are validated and
//! SQL-quote-escaped before rendering; a value containing an unescaped
//! template delimiter sequence or NUL is rejected rather than inserted. A
//! delimiter whose first character is backslash-escaped, such as the regex
//! `\{#tag`, is a literal and passes.

use minijinja::{context, Environment, UndefinedBehavior};
use sourcesense_core::{CompiledFilter, SYSTEM_CONTAINERS};

/// Sequences that may not appear unescaped in placeholder values
const DELIMITERS: &[&str] = &["{{", "}}", "{%", "%}", "{#", "#}"];

/// Template errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum TemplateError {
    #[error("Unsafe value for placeholder '{placeholder}': {reason}")]
    UnsafeValue {
        placeholder: &'static str,
        reason: String,
    },

    #[error("Template '{name}' failed to render: {message}")]
    Render { name: &'static str, message: String },
}

/// Escaped values for the filter placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateParams {
    pub normalized_exclude_regex: String,
    pub normalized_include_regex: String,

    /// Complete `AND table_name !~ '...'` fragment, or empty
    pub temp_table_regex_sql: String,

    /// Quoted, comma-separated system container names
    pub system_containers_sql: String,
}

impl TemplateParams {
    pub fn from_filter(filter: &CompiledFilter) -> Result<Self, TemplateError> {
        let temp_table_regex_sql = match filter.normalized_temp_table_regex() {
            Some(regex) => format!(
                "AND table_name::text !~ '{}'",
                sql_literal("temp_table_regex_sql", &regex)?
            ),
            None => String::new(),
        };

        let system_containers_sql = SYSTEM_CONTAINERS
            .iter()
            .map(|name| format!("'{}'", name))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(Self {
            normalized_exclude_regex: sql_literal(
                "normalized_exclude_regex",
                &filter.normalized_exclude_regex(),
            )?,
            normalized_include_regex: sql_literal(
                "normalized_include_regex",
                &filter.normalized_include_regex(),
            )?,
            temp_table_regex_sql,
            system_containers_sql,
        })
    }
}

/// Escape a value for use inside a single-quoted SQL literal
pub fn sql_literal(placeholder: &'static str, value: &str) -> Result<String, TemplateError> {
    if let Some(delim) = unescaped_delimiter(value) {
        let escaped = format!("\\{}", delim);
        return Err(TemplateError::UnsafeValue {
            placeholder,
            reason: format!(
                "contains unescaped template delimiter '{}'; write '{}' to match it literally",
                delim, escaped
            ),
        });
    }
    if value.contains('\0') {
        return Err(TemplateError::UnsafeValue {
            placeholder,
            reason: "contains NUL".to_string(),
        });
    }
    Ok(value.replace('\'', "''"))
}

/// First delimiter in `value` whose opening character is not backslash-escaped
fn unescaped_delimiter(value: &str) -> Option<&'static str> {
    value.char_indices().find_map(|(at, _)| {
        DELIMITERS
            .iter()
            .copied()
            .find(|delim| value[at..].starts_with(delim))
            .filter(|_| !is_escaped(value, at))
    })
}

/// Whether the character at byte offset `at` follows an odd run of backslashes
fn is_escaped(value: &str, at: usize) -> bool {
    value[..at].chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

/// A named query template
#[derive(Debug, Clone, Copy)]
pub struct QueryTemplate {
    pub name: &'static str,
    pub source: &'static str,
}

impl QueryTemplate {
    pub const fn new(name: &'static str, source: &'static str) -> Self {
        Self { name, source }
    }

    /// Render with the given placeholder values
    pub fn render(&self, params: &TemplateParams) -> Result<String, TemplateError> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);

        env.render_str(
            self.source,
            context! {
                normalized_exclude_regex => &params.normalized_exclude_regex,
                normalized_include_regex => &params.normalized_include_regex,
                temp_table_regex_sql => &params.temp_table_regex_sql,
                system_containers_sql => &params.system_containers_sql,
            },
        )
        .map_err(|e| TemplateError::Render {
            name: self.name,
            message: e.to_string(),
        })
    }
}
