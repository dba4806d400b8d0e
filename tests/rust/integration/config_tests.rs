//! Loading configuration from YAML files and the environment.

use std::io::Write;

use fhirpath_sql::config::{ConfigError, ConstantValue, OutputMode, TranslatorConfig};
use fhirpath_sql::sql_dialect::DialectKind;
use serial_test::serial;
use tempfile::NamedTempFile;

const ENV_VARS: &[&str] = &[
    "FHIRPATH_SQL_DIALECT",
    "FHIRPATH_SQL_RESOURCE_TABLE",
    "FHIRPATH_SQL_OUTPUT_MODE",
    "FHIRPATH_SQL_CONSTANTS",
];

fn clear_env() {
    for key in ENV_VARS {
        std::env::remove_var(key);
    }
}

fn yaml_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_yaml_config() {
    let file = yaml_file(
        r#"
dialect: postgresql
resource_table: fhir_patient
inline_scalar_fragments: true
output_mode: rows
constants:
  limit: 3
  system: http://loinc.org
"#,
    );
    let config = TranslatorConfig::from_yaml_file(file.path()).unwrap();
    assert_eq!(config.dialect, DialectKind::PostgreSql);
    assert_eq!(config.resource_table.as_deref(), Some("fhir_patient"));
    assert!(config.inline_scalar_fragments);
    assert_eq!(config.output_mode, OutputMode::Rows);
    assert_eq!(config.constants["limit"], ConstantValue::Integer(3));
    assert_eq!(
        config.constants["system"],
        ConstantValue::String("http://loinc.org".to_string())
    );
    // unspecified fields keep their defaults
    assert_eq!(config.id_column, "id");
    assert_eq!(config.cte_prefix, "fhirpath_cte");
}

#[test]
fn test_yaml_config_is_validated() {
    let file = yaml_file("id_column: \"patient id\"\n");
    assert!(matches!(
        TranslatorConfig::from_yaml_file(file.path()),
        Err(ConfigError::Validation(_))
    ));
}

#[test]
fn test_missing_yaml_file() {
    assert!(matches!(
        TranslatorConfig::from_yaml_file("/nonexistent/fhirpath-sql.yaml"),
        Err(ConfigError::Parse { .. })
    ));
}

#[test]
#[serial]
fn test_env_config() {
    clear_env();
    std::env::set_var("FHIRPATH_SQL_DIALECT", "pg");
    std::env::set_var("FHIRPATH_SQL_RESOURCE_TABLE", "resources");
    std::env::set_var("FHIRPATH_SQL_CONSTANTS", "max_age=65, flag=true");

    let config = TranslatorConfig::from_env();
    clear_env();

    let config = config.unwrap();
    assert_eq!(config.dialect, DialectKind::PostgreSql);
    assert_eq!(config.table_for("Patient"), "resources");
    assert_eq!(config.constants["max_age"], ConstantValue::Integer(65));
    assert_eq!(config.constants["flag"], ConstantValue::Boolean(true));
}

#[test]
#[serial]
fn test_env_config_rejects_unknown_dialect() {
    clear_env();
    std::env::set_var("FHIRPATH_SQL_DIALECT", "oracle");
    let result = TranslatorConfig::from_env();
    clear_env();

    match result {
        Err(ConfigError::Parse { field, value, .. }) => {
            assert_eq!(field, "FHIRPATH_SQL_DIALECT");
            assert_eq!(value, "oracle");
        }
        other => panic!("expected a parse error, got {:?}", other),
    }
}

#[test]
#[serial]
fn test_env_defaults() {
    clear_env();
    let config = TranslatorConfig::from_env().unwrap();
    assert_eq!(config, TranslatorConfig::default());
}

#[test]
fn test_cli_overrides_merge_constants() {
    let mut base = TranslatorConfig::default();
    base.constants
        .insert("limit".to_string(), ConstantValue::Integer(1));
    base.constants
        .insert("keep".to_string(), ConstantValue::Boolean(false));

    let overrides = TranslatorConfig {
        dialect: DialectKind::PostgreSql,
        constants: [("limit".to_string(), ConstantValue::Integer(5))]
            .into_iter()
            .collect(),
        ..Default::default()
    };
    base.merge(overrides);

    assert_eq!(base.dialect, DialectKind::PostgreSql);
    assert_eq!(base.constants["limit"], ConstantValue::Integer(5));
    assert_eq!(base.constants["keep"], ConstantValue::Boolean(false));
}
