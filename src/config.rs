use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;
use validator::{Validate, ValidationError};

use crate::sql_dialect::DialectKind;
use crate::utils::cte_naming::DEFAULT_CTE_PREFIX;

/// Prefix of every environment variable read by [`TranslatorConfig::from_env`]
pub const ENV_PREFIX: &str = "FHIRPATH_SQL_";

static SQL_IDENTIFIER: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid SQL identifier regex")
});

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Shape of the compiled query's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// One row per resource; `value` holds the whole collection
    #[default]
    Collection,
    /// One row per collection item
    Rows,
}

impl FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "collection" => Ok(OutputMode::Collection),
            "rows" => Ok(OutputMode::Rows),
            other => Err(format!(
                "unknown output mode '{}' (expected 'collection' or 'rows')",
                other
            )),
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputMode::Collection => write!(f, "collection"),
            OutputMode::Rows => write!(f, "rows"),
        }
    }
}

/// Value bound to an external `%name` constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConstantValue {
    Boolean(bool),
    Integer(i64),
    Decimal(f64),
    String(String),
}

impl FromStr for ConstantValue {
    type Err = String;

    /// `true`/`false`, integers and decimals are typed; anything else is a string.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(b) = s.parse::<bool>() {
            return Ok(ConstantValue::Boolean(b));
        }
        if let Ok(i) = s.parse::<i64>() {
            return Ok(ConstantValue::Integer(i));
        }
        if let Ok(d) = s.parse::<f64>() {
            if d.is_finite() {
                return Ok(ConstantValue::Decimal(d));
            }
        }
        Ok(ConstantValue::String(s.to_string()))
    }
}

/// Translator and CTE assembly configuration with validation
#[derive(Clone, Debug, Validate, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TranslatorConfig {
    /// Target database
    pub dialect: DialectKind,

    /// Resource type the expression is evaluated against. When unset it is
    /// taken from the expression's first identifier.
    pub resource_type: Option<String>,

    /// Table holding the resources (defaults to the lowercased resource type)
    #[validate(custom(function = "validate_sql_identifier"))]
    pub resource_table: Option<String>,

    /// Row id column of the resource table
    #[validate(custom(function = "validate_sql_identifier"))]
    pub id_column: String,

    /// JSON document column of the resource table
    #[validate(custom(function = "validate_sql_identifier"))]
    pub resource_column: String,

    /// Prefix of generated CTE names
    #[validate(
        length(min = 1, max = 48, message = "CTE prefix must be 1-48 characters"),
        custom(function = "validate_sql_identifier")
    )]
    pub cte_prefix: String,

    /// Fold single-use scalar fragments into their consumer
    pub inline_scalar_fragments: bool,

    pub output_mode: OutputMode,

    /// Maximum nesting depth accepted by the AST validator
    #[validate(range(
        min = 1,
        max = 1024,
        message = "Max expression depth must be between 1 and 1024"
    ))]
    pub max_expression_depth: usize,

    /// External constants available as `%name`
    pub constants: BTreeMap<String, ConstantValue>,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            dialect: DialectKind::DuckDb,
            resource_type: None,
            resource_table: None,
            id_column: "id".to_string(),
            resource_column: "resource".to_string(),
            cte_prefix: DEFAULT_CTE_PREFIX.to_string(),
            inline_scalar_fragments: false,
            output_mode: OutputMode::Collection,
            max_expression_depth: crate::fhirpath_ast::DEFAULT_MAX_DEPTH,
            constants: BTreeMap::new(),
        }
    }
}

impl TranslatorConfig {
    /// Create configuration from environment variables with validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            dialect: parse_env_var(&env_key("DIALECT"), defaults.dialect.as_str())?,
            resource_type: optional_env_var(&env_key("RESOURCE_TYPE")),
            resource_table: optional_env_var(&env_key("RESOURCE_TABLE")),
            id_column: env::var(env_key("ID_COLUMN")).unwrap_or(defaults.id_column),
            resource_column: env::var(env_key("RESOURCE_COLUMN"))
                .unwrap_or(defaults.resource_column),
            cte_prefix: env::var(env_key("CTE_PREFIX")).unwrap_or(defaults.cte_prefix),
            inline_scalar_fragments: parse_env_var(&env_key("INLINE_SCALARS"), "false")?,
            output_mode: parse_env_var(&env_key("OUTPUT_MODE"), "collection")?,
            max_expression_depth: parse_env_var(
                &env_key("MAX_DEPTH"),
                &defaults.max_expression_depth.to_string(),
            )?,
            constants: match optional_env_var(&env_key("CONSTANTS")) {
                Some(spec) => parse_constants(&spec)?,
                None => BTreeMap::new(),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from CLI arguments with validation
    pub fn from_cli(cli: CliConfig) -> Result<Self, ConfigError> {
        let mut constants = BTreeMap::new();
        for assignment in &cli.constants {
            let (name, value) = parse_constant_assignment(assignment)?;
            constants.insert(name, value);
        }

        let config = Self {
            dialect: cli.dialect,
            resource_type: cli.resource_type,
            resource_table: cli.resource_table,
            id_column: cli.id_column,
            resource_column: cli.resource_column,
            cte_prefix: cli.cte_prefix,
            inline_scalar_fragments: cli.inline_scalar_fragments,
            output_mode: cli.output_mode,
            max_expression_depth: cli.max_expression_depth,
            constants,
        };

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from YAML file
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            field: "yaml_file".to_string(),
            value: "file read failed".to_string(),
            source: Box::new(e),
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            field: "yaml_content".to_string(),
            value: content,
            source: Box::new(e),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Merge with another configuration (CLI overrides environment).
    /// Constants are combined, `other` winning on conflicts.
    pub fn merge(&mut self, other: Self) {
        self.dialect = other.dialect;
        if other.resource_type.is_some() {
            self.resource_type = other.resource_type;
        }
        if other.resource_table.is_some() {
            self.resource_table = other.resource_table;
        }
        self.id_column = other.id_column;
        self.resource_column = other.resource_column;
        self.cte_prefix = other.cte_prefix;
        self.inline_scalar_fragments = other.inline_scalar_fragments;
        self.output_mode = other.output_mode;
        self.max_expression_depth = other.max_expression_depth;
        self.constants.extend(other.constants);
    }

    /// Table read for a resource type.
    pub fn table_for(&self, resource_type: &str) -> String {
        self.resource_table
            .clone()
            .unwrap_or_else(|| resource_type.to_lowercase())
    }
}

/// CLI configuration (parsed from command line arguments)
#[derive(Clone, Debug)]
pub struct CliConfig {
    pub dialect: DialectKind,
    pub resource_type: Option<String>,
    pub resource_table: Option<String>,
    pub id_column: String,
    pub resource_column: String,
    pub cte_prefix: String,
    pub inline_scalar_fragments: bool,
    pub output_mode: OutputMode,
    pub max_expression_depth: usize,
    /// `name=value` assignments
    pub constants: Vec<String>,
}

fn env_key(name: &str) -> String {
    format!("{}{}", ENV_PREFIX, name)
}

fn optional_env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse an environment variable with a default value
fn parse_env_var<T: FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|e: T::Err| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: e.into(),
    })
}

/// `name=value` → constant binding
fn parse_constant_assignment(assignment: &str) -> Result<(String, ConstantValue), ConfigError> {
    let Some((name, value)) = assignment.split_once('=') else {
        return Err(ConfigError::Parse {
            field: "constant".to_string(),
            value: assignment.to_string(),
            source: "expected name=value".into(),
        });
    };
    let name = name.trim().trim_start_matches('%');
    if !SQL_IDENTIFIER.is_match(name) {
        return Err(ConfigError::Parse {
            field: "constant".to_string(),
            value: assignment.to_string(),
            source: format!("invalid constant name '{}'", name).into(),
        });
    }
    let value = value.parse::<ConstantValue>().map_err(|e| ConfigError::Parse {
        field: "constant".to_string(),
        value: assignment.to_string(),
        source: e.into(),
    })?;
    Ok((name.to_string(), value))
}

/// Comma-separated `name=value` list
fn parse_constants(spec: &str) -> Result<BTreeMap<String, ConstantValue>, ConfigError> {
    spec.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_constant_assignment)
        .collect()
}

fn validate_sql_identifier(value: &str) -> Result<(), ValidationError> {
    if SQL_IDENTIFIER.is_match(value) {
        Ok(())
    } else {
        let mut error = ValidationError::new("sql_identifier");
        error.message = Some(format!("'{}' is not a plain SQL identifier", value).into());
        Err(error)
    }
}
