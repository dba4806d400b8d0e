use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use fhirpath_sql::config::{self, OutputMode, TranslatorConfig};
use fhirpath_sql::sql_dialect::DialectKind;
use fhirpath_sql::{compile, parse_ast_json, Translator};

/// fhirpath-sql - compile a FHIRPath AST (JSON) into one SQL statement
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// AST file in JSON form; reads stdin when omitted or `-`
    input: Option<PathBuf>,

    /// YAML configuration file (environment variables apply otherwise)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Target database: duckdb or postgresql
    #[arg(long)]
    dialect: Option<DialectKind>,

    /// Resource type the expression is evaluated against
    #[arg(long)]
    resource_type: Option<String>,

    /// Table holding the resources
    #[arg(long)]
    resource_table: Option<String>,

    /// Row id column of the resource table
    #[arg(long)]
    id_column: Option<String>,

    /// JSON column of the resource table
    #[arg(long)]
    resource_column: Option<String>,

    /// Prefix of generated CTE names
    #[arg(long)]
    cte_prefix: Option<String>,

    /// Fold single-use scalar CTEs into their consumer
    #[arg(long)]
    inline_scalars: bool,

    /// Result shape: collection or rows
    #[arg(long)]
    output_mode: Option<OutputMode>,

    /// Maximum AST nesting depth
    #[arg(long)]
    max_depth: Option<usize>,

    /// External constant as name=value (repeatable)
    #[arg(long = "constant", value_name = "NAME=VALUE")]
    constants: Vec<String>,

    /// Print the translated fragments instead of the assembled statement
    #[arg(long)]
    fragments: bool,

    /// Print the compiled query with its source tables and warnings as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    /// CLI flags on top of `base`; flags left out keep the base value.
    fn to_cli_config(&self, base: &TranslatorConfig) -> config::CliConfig {
        config::CliConfig {
            dialect: self.dialect.unwrap_or(base.dialect),
            resource_type: self
                .resource_type
                .clone()
                .or_else(|| base.resource_type.clone()),
            resource_table: self
                .resource_table
                .clone()
                .or_else(|| base.resource_table.clone()),
            id_column: self
                .id_column
                .clone()
                .unwrap_or_else(|| base.id_column.clone()),
            resource_column: self
                .resource_column
                .clone()
                .unwrap_or_else(|| base.resource_column.clone()),
            cte_prefix: self
                .cte_prefix
                .clone()
                .unwrap_or_else(|| base.cte_prefix.clone()),
            inline_scalar_fragments: self.inline_scalars || base.inline_scalar_fragments,
            output_mode: self.output_mode.unwrap_or(base.output_mode),
            max_expression_depth: self.max_depth.unwrap_or(base.max_expression_depth),
            constants: self.constants.clone(),
        }
    }
}

fn read_input(input: Option<&PathBuf>) -> anyhow::Result<String> {
    match input {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read AST file {}", path.display())),
        _ => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read AST from stdin")?;
            Ok(buffer)
        }
    }
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    // Initialize logger - defaults to INFO level, can be overridden with RUST_LOG env var
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => TranslatorConfig::from_yaml_file(path)
            .with_context(|| format!("Invalid configuration file {}", path.display()))?,
        None => TranslatorConfig::from_env().context("Invalid environment configuration")?,
    };
    let overrides = TranslatorConfig::from_cli(cli.to_cli_config(&config))
        .context("Invalid command line configuration")?;
    config.merge(overrides);
    log::debug!("Compiling for {} with {:?}", config.dialect, config);

    let json = read_input(cli.input.as_ref())?;
    let ast = parse_ast_json(&json)?;

    if cli.fragments {
        let translator = Translator::from_config(&config);
        for fragment in translator.translate(&ast)? {
            println!("{}", fragment);
            println!("    {}", fragment.expression);
        }
        return Ok(());
    }

    let query = compile(&ast, &config)?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&query)?);
    } else {
        println!("{};", query.sql);
    }
    Ok(())
}
