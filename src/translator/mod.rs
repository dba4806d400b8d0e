//! FHIRPath AST to SQL fragment translation.
//!
//! The translator walks the tree once, deciding FHIRPath semantics and asking
//! the active [`Dialect`] for syntax. Each value that reads a relation is
//! materialized as a [`SqlFragment`] named by the context's counter, so the
//! fragment list is emitted in dependency order. Lambda bodies (`where()`,
//! `select()`, ...) are the exception: they stay inline as correlated
//! subqueries over the unnested item rows.

pub mod context;
pub mod errors;
pub mod expr;
pub mod fragment;
pub mod function_registry;
mod functions;
mod literals;
mod operators;
mod paths;
mod type_ops;

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::{ConstantValue, OutputMode, TranslatorConfig};
use crate::fhirpath_ast::{validate_expression, ExpressionNode, LiteralValue, TypeOperator};
use crate::sql_dialect::{create_dialect, Dialect, SqlType};
use crate::type_registry::{TypeNamespace, TYPE_REGISTRY};

pub use context::TranslationContext;
pub use errors::TranslationError;
pub use expr::{ChoiceInfo, SqlExpr, ValueShape};
pub use fragment::{
    SqlFragment, META_FHIR_TYPE, META_FILTER, META_JOIN, META_UNNEST_SOURCE, META_VALUE_KIND,
};

use type_ops::TypeTest;

/// Well-known terminology constants
const UCUM_URL: &str = "http://unitsofmeasure.org";
const SNOMED_URL: &str = "http://snomed.info/sct";
const LOINC_URL: &str = "http://loinc.org";

/// Translates FHIRPath expressions into SQL fragments for one dialect.
///
/// Holds no per-call state; every translation gets its own
/// [`TranslationContext`].
pub struct Translator {
    dialect: Arc<dyn Dialect>,
    config: TranslatorConfig,
}

impl Translator {
    pub fn new(dialect: Arc<dyn Dialect>) -> Self {
        let config = TranslatorConfig {
            dialect: dialect.kind(),
            ..Default::default()
        };
        Self { dialect, config }
    }

    pub fn with_config(dialect: Arc<dyn Dialect>, config: TranslatorConfig) -> Self {
        Self { dialect, config }
    }

    /// Build a translator for the dialect named in the configuration.
    pub fn from_config(config: &TranslatorConfig) -> Self {
        Self::with_config(create_dialect(config.dialect), config.clone())
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub fn config(&self) -> &TranslatorConfig {
        &self.config
    }

    /// Translate an expression into fragments, the last one being the result.
    pub fn translate(&self, ast: &ExpressionNode) -> Result<Vec<SqlFragment>, TranslationError> {
        let mut ctx = self.new_context(ast)?;
        self.translate_with_context(ast, &mut ctx)
    }

    /// Create the context an expression is translated in: resource type,
    /// source table and fragment naming.
    pub fn new_context(&self, ast: &ExpressionNode) -> Result<TranslationContext, TranslationError> {
        let resource_type = self.resolve_resource_type(ast)?;
        let table = self.config.table_for(&resource_type);
        Ok(TranslationContext::new(
            table,
            resource_type,
            self.config.cte_prefix.clone(),
        ))
    }

    /// Translate with a caller-provided context, leaving warnings and bound
    /// variables inspectable afterwards.
    pub fn translate_with_context(
        &self,
        ast: &ExpressionNode,
        ctx: &mut TranslationContext,
    ) -> Result<Vec<SqlFragment>, TranslationError> {
        validate_expression(ast, self.config.max_expression_depth)?;
        log::debug!(
            "Translating '{}' against {} ({})",
            ast,
            ctx.resource_type,
            self.dialect.name()
        );

        let result = self.visit(ast, ctx)?;
        let fragments = self.finalize(result, ctx);

        log::debug!(
            "Translation produced {} fragment(s), {} warning(s)",
            fragments.len(),
            ctx.warnings().len()
        );
        Ok(fragments)
    }

    fn resolve_resource_type(&self, ast: &ExpressionNode) -> Result<String, TranslationError> {
        if let Some(configured) = &self.config.resource_type {
            return match TYPE_REGISTRY.get(TypeNamespace::Fhir, configured) {
                Some(entry) if entry.is_resource() => Ok(entry.name.to_string()),
                _ => Err(TranslationError::UnknownResourceType(configured.clone())),
            };
        }

        match ast.root_identifier() {
            Some(name) if name.starts_with(|c: char| c.is_ascii_uppercase()) => {
                match TYPE_REGISTRY.get(TypeNamespace::Fhir, name) {
                    Some(entry) if entry.is_resource() => Ok(entry.name.to_string()),
                    _ => Err(TranslationError::UnknownResourceType(name.to_string())),
                }
            }
            _ => Err(TranslationError::MissingResourceType),
        }
    }

    // ===== Visitor =====

    pub(crate) fn visit(
        &self,
        node: &ExpressionNode,
        ctx: &mut TranslationContext,
    ) -> Result<SqlExpr, TranslationError> {
        ctx.push_path(node.kind_name());
        log::trace!("visit {} '{}'", ctx.current_path(), node);
        let result = self.visit_node(node, ctx);
        ctx.pop_path();
        self.materialize(result?, ctx)
    }

    fn visit_node(
        &self,
        node: &ExpressionNode,
        ctx: &mut TranslationContext,
    ) -> Result<SqlExpr, TranslationError> {
        match node {
            ExpressionNode::Literal { value } => self.visit_literal(value, node),
            ExpressionNode::Identifier { name } => self.visit_identifier(name, ctx),
            ExpressionNode::Path { base, name } => {
                let base = self.visit(base, ctx)?;
                self.navigate(&base, name)
            }
            ExpressionNode::Variable { name } => self.visit_variable(name, ctx),
            ExpressionNode::FunctionCall { base, name, args } => {
                self.visit_function(base.as_deref(), name, args, node, ctx)
            }
            ExpressionNode::BinaryOperation {
                operator,
                left,
                right,
            } => self.visit_binary(*operator, left, right, node, ctx),
            ExpressionNode::UnaryOperation { polarity, operand } => {
                self.visit_unary(*polarity, operand, node, ctx)
            }
            ExpressionNode::TypeOperation {
                operator,
                operand,
                type_specifier,
            } => {
                let operand = self.visit(operand, ctx)?;
                let test = match operator {
                    TypeOperator::Is => TypeTest::Is,
                    TypeOperator::As => TypeTest::As,
                };
                self.type_operation(test, operand, type_specifier, &node.to_string(), ctx)
            }
            ExpressionNode::Union { left, right } => self.visit_union(left, right, node, ctx),
            ExpressionNode::Indexer { base, index } => {
                self.visit_indexer(base, index, node, ctx)
            }
        }
    }

    /// Emit a fragment for a value that reads a relation, outside lambda scope.
    fn materialize(
        &self,
        expr: SqlExpr,
        ctx: &mut TranslationContext,
    ) -> Result<SqlExpr, TranslationError> {
        if ctx.in_lambda() || expr.tables.is_empty() || expr.column_ref {
            return Ok(expr);
        }

        let name = ctx.next_cte_name();
        let fragment = self.fragment_for(&name, &expr.sql, &expr, &expr.tables[0]);
        ctx.push_fragment(fragment);

        Ok(SqlExpr {
            sql: format!("{}.value", name),
            tables: vec![name],
            column_ref: true,
            ..expr
        })
    }

    fn fragment_for(
        &self,
        name: &str,
        expression: &str,
        expr: &SqlExpr,
        source: &str,
    ) -> SqlFragment {
        let mut dependencies = expr.tables.clone();
        if dependencies.is_empty() {
            dependencies.push(source.to_string());
        }
        let joins: Vec<&str> = dependencies
            .iter()
            .map(String::as_str)
            .filter(|t| *t != source)
            .collect();

        let mut fragment = SqlFragment::new(name, expression, source)
            .with_metadata(META_VALUE_KIND, expr.shape.describe());
        if !joins.is_empty() {
            fragment = fragment.with_metadata(META_JOIN, joins.join(","));
        }
        if let Some(fhir_type) = &expr.fhir_type {
            fragment = fragment.with_metadata(META_FHIR_TYPE, fhir_type.clone());
        }
        fragment.with_dependencies(dependencies)
    }

    /// Evaluate an aggregate over the items of a collection.
    ///
    /// Inside a lambda (or for a constant collection) this is an inline scalar
    /// subquery; otherwise an unnest + aggregate fragment is emitted and
    /// referenced. `alias` names the item rows `aggregate` and `filter` read;
    /// `extra` lists further values those expressions use.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn collection_subquery(
        &self,
        collection: &SqlExpr,
        alias: &str,
        aggregate: &str,
        filter: Option<&str>,
        extra: &[&SqlExpr],
        shape: ValueShape,
        fhir_type: Option<String>,
        path: &str,
        ctx: &mut TranslationContext,
    ) -> SqlExpr {
        let collection = self.as_collection(collection);
        let unnest = self.dialect.unnest_json_array(&collection.sql, alias);
        let mut parts = vec![&collection];
        parts.extend_from_slice(extra);
        let mut result = SqlExpr::composite("", shape, &parts, path);
        if fhir_type.is_some() {
            result.fhir_type = fhir_type;
        }

        if ctx.in_lambda() || result.tables.is_empty() {
            let where_clause = filter
                .map(|f| format!(" WHERE {}", f))
                .unwrap_or_default();
            result.sql = format!("(SELECT {} FROM {}{})", aggregate, unnest, where_clause);
            return result;
        }

        let name = ctx.next_cte_name();
        let source = result.tables[0].clone();
        let mut fragment = self
            .fragment_for(&name, aggregate, &result, &source)
            .with_unnest(unnest, true);
        if let Some(filter) = filter {
            fragment = fragment.with_metadata(META_FILTER, filter);
        }
        ctx.push_fragment(fragment);

        result.sql = format!("{}.value", name);
        result.tables = vec![name];
        result.column_ref = true;
        result
    }

    /// Run `body` with `$this` bound to each item of `collection`.
    /// Returns the alias naming the item rows and the body's value.
    pub(crate) fn in_lambda<T>(
        &self,
        collection: &SqlExpr,
        ctx: &mut TranslationContext,
        body: impl FnOnce(&mut TranslationContext) -> Result<T, TranslationError>,
    ) -> Result<(String, T), TranslationError> {
        let alias = ctx.next_item_alias();
        let item = SqlExpr::item(&alias, collection.fhir_type.clone());
        ctx.enter_lambda(alias.clone(), item);
        let result = body(ctx);
        ctx.exit_lambda();
        Ok((alias, result?))
    }

    /// Ordering expression for the item rows of a lambda.
    pub(crate) fn ordinal(alias: &str) -> String {
        format!("{}.ordinal", alias)
    }

    // ===== Roots and variables =====

    /// The resource row itself.
    pub(crate) fn root(&self, ctx: &TranslationContext) -> SqlExpr {
        SqlExpr {
            sql: format!("{}.{}", ctx.current_table, self.config.resource_column),
            shape: ValueShape::Json,
            fhir_type: Some(ctx.resource_type.clone()),
            choice: None,
            tables: vec![ctx.current_table.clone()],
            column_ref: true,
            path: ctx.resource_type.clone(),
            literal: None,
        }
    }

    /// `$this`: the lambda item, or the resource at the top level.
    pub(crate) fn this(&self, ctx: &TranslationContext) -> SqlExpr {
        ctx.focus().cloned().unwrap_or_else(|| self.root(ctx))
    }

    fn visit_identifier(
        &self,
        name: &str,
        ctx: &mut TranslationContext,
    ) -> Result<SqlExpr, TranslationError> {
        if let Some(focus) = ctx.focus().cloned() {
            return self.navigate(&focus, name);
        }

        let is_type_name = name.starts_with(|c: char| c.is_ascii_uppercase());
        if is_type_name && TYPE_REGISTRY.is_subtype_of(&ctx.resource_type, name) {
            return Ok(self.root(ctx));
        }
        if is_type_name {
            if let Some(entry) = TYPE_REGISTRY.get(TypeNamespace::Fhir, name) {
                if entry.is_resource() {
                    return Err(TranslationError::ResourceTypeMismatch {
                        expected: ctx.resource_type.clone(),
                        found: name.to_string(),
                    });
                }
            }
        }

        let root = self.root(ctx);
        self.navigate(&root, name)
    }

    fn visit_variable(
        &self,
        name: &str,
        ctx: &mut TranslationContext,
    ) -> Result<SqlExpr, TranslationError> {
        let d = self.dialect.as_ref();
        match name {
            "$this" => Ok(self.this(ctx)),
            "$index" => match ctx.lambda_alias() {
                Some(alias) => Ok(SqlExpr::constant(
                    Self::ordinal(alias),
                    SqlType::Integer,
                    "$index",
                )),
                None => Err(TranslationError::UnboundVariable(name.to_string())),
            },
            "%resource" | "%context" | "%rootResource" => Ok(self.root(ctx)),
            "%ucum" => Ok(SqlExpr::constant(d.string_literal(UCUM_URL), SqlType::String, name)),
            "%sct" => Ok(SqlExpr::constant(d.string_literal(SNOMED_URL), SqlType::String, name)),
            "%loinc" => Ok(SqlExpr::constant(d.string_literal(LOINC_URL), SqlType::String, name)),
            _ => {
                if let Some(bound) = ctx.variable(name) {
                    return Ok(bound.clone());
                }
                let key = name.trim_start_matches('%');
                match self.config.constants.get(key) {
                    Some(value) if name.starts_with('%') => Ok(self.constant_value(value, name)),
                    _ => Err(TranslationError::UnboundVariable(name.to_string())),
                }
            }
        }
    }

    fn constant_value(&self, value: &ConstantValue, name: &str) -> SqlExpr {
        let d = self.dialect.as_ref();
        match value {
            ConstantValue::Boolean(b) => {
                SqlExpr::constant(d.boolean_literal(*b), SqlType::Boolean, name)
            }
            ConstantValue::Integer(i) => {
                SqlExpr::constant(d.integer_literal(*i), SqlType::Integer, name)
                    .with_literal(LiteralValue::Integer(*i))
            }
            ConstantValue::Decimal(f) => {
                let text = f.to_string();
                SqlExpr::constant(d.decimal_literal(&text), SqlType::Decimal, name)
                    .with_literal(LiteralValue::Decimal(text))
            }
            ConstantValue::String(s) => {
                SqlExpr::constant(d.string_literal(s), SqlType::String, name)
                    .with_literal(LiteralValue::String(s.clone()))
            }
        }
    }

    // ===== Result =====

    /// Emit the terminal fragment and drop fragments it does not reach.
    fn finalize(&self, result: SqlExpr, ctx: &mut TranslationContext) -> Vec<SqlFragment> {
        let name = ctx.next_cte_name();
        let source = result
            .tables
            .first()
            .cloned()
            .unwrap_or_else(|| ctx.current_table.clone());

        let terminal = match self.config.output_mode {
            OutputMode::Collection => self.fragment_for(&name, &result.sql, &result, &source),
            OutputMode::Rows => {
                let collection = self.as_collection(&result);
                let alias = ctx.next_item_alias();
                let unnest = self.dialect.unnest_json_array(&collection.sql, &alias);
                let rows = SqlExpr {
                    shape: ValueShape::Json,
                    ..collection
                };
                self.fragment_for(&name, &format!("{}.value", alias), &rows, &source)
                    .with_unnest(unnest, false)
            }
        };
        ctx.push_fragment(terminal);

        let fragments = ctx.take_fragments();
        let total = fragments.len();
        let reachable = reachable_fragments(&fragments);
        let kept: Vec<SqlFragment> = fragments
            .into_iter()
            .filter(|f| reachable.contains(&f.name))
            .collect();
        if kept.len() < total {
            log::debug!("Dropped {} unreferenced fragment(s)", total - kept.len());
        }
        kept
    }
}

/// Names of the fragments the last fragment depends on, transitively.
fn reachable_fragments(fragments: &[SqlFragment]) -> HashSet<String> {
    let mut reachable = HashSet::new();
    let Some(terminal) = fragments.last() else {
        return reachable;
    };
    let by_name: std::collections::HashMap<&str, &SqlFragment> =
        fragments.iter().map(|f| (f.name.as_str(), f)).collect();

    let mut stack = vec![terminal.name.as_str()];
    while let Some(name) = stack.pop() {
        if !reachable.insert(name.to_string()) {
            continue;
        }
        if let Some(fragment) = by_name.get(name) {
            stack.extend(
                fragment
                    .dependencies
                    .iter()
                    .map(String::as_str)
                    .filter(|dep| by_name.contains_key(dep)),
            );
        }
    }
    reachable
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fhirpath_ast::BinaryOperator;
    use crate::sql_dialect::{DialectKind, DuckDbDialect, PostgresDialect};

    fn duckdb() -> Translator {
        Translator::new(Arc::new(DuckDbDialect::new()))
    }

    fn names(fragments: &[SqlFragment]) -> Vec<&str> {
        fragments.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn test_resource_root_reads_resource_column() {
        let fragments = duckdb()
            .translate(&ExpressionNode::identifier("Patient"))
            .unwrap();
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].expression, "patient.resource");
        assert_eq!(fragments[0].source_table, "patient");
    }

    #[test]
    fn test_path_chain_emits_fragments_in_order() {
        let ast = ExpressionNode::dotted("Patient.name.given")
            .call("first", vec![])
            .call("upper", vec![]);
        let fragments = duckdb().translate(&ast).unwrap();

        assert!(fragments.len() >= 2);
        assert_eq!(fragments[0].source_table, "patient");
        assert!(fragments[0].expression.contains("'$.name[*]'"));
        // every dependency is emitted before its dependent
        for (i, fragment) in fragments.iter().enumerate() {
            for dep in &fragment.dependencies {
                if let Some(pos) = fragments.iter().position(|f| &f.name == dep) {
                    assert!(pos < i, "{} references later {}", fragment.name, dep);
                }
            }
        }
        let last = fragments.last().unwrap();
        assert!(fragments[fragments.len() - 2].expression.contains("upper("));
        assert_eq!(last.meta(META_VALUE_KIND), Some("native:String"));
    }

    #[test]
    fn test_constant_expression_reads_resource_table() {
        let ast = ExpressionNode::binary(
            BinaryOperator::Add,
            ExpressionNode::integer(2),
            ExpressionNode::integer(3),
        );
        let translator = Translator::with_config(
            Arc::new(DuckDbDialect::new()),
            TranslatorConfig {
                resource_type: Some("Observation".to_string()),
                ..Default::default()
            },
        );
        let fragments = translator.translate(&ast).unwrap();
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].expression, "(2 + 3)");
        assert_eq!(fragments[0].source_table, "observation");
    }

    #[test]
    fn test_missing_resource_type() {
        let ast = ExpressionNode::dotted("name.given");
        assert_eq!(
            duckdb().translate(&ast).unwrap_err(),
            TranslationError::MissingResourceType
        );
        assert_eq!(
            duckdb()
                .translate(&ExpressionNode::dotted("Patientx.name"))
                .unwrap_err(),
            TranslationError::UnknownResourceType("Patientx".to_string())
        );
    }

    #[test]
    fn test_other_resource_type_is_a_mismatch() {
        let translator = Translator::with_config(
            Arc::new(DuckDbDialect::new()),
            TranslatorConfig {
                resource_type: Some("Patient".to_string()),
                ..Default::default()
            },
        );
        let err = translator
            .translate(&ExpressionNode::dotted("Observation.status"))
            .unwrap_err();
        assert_eq!(
            err,
            TranslationError::ResourceTypeMismatch {
                expected: "Patient".to_string(),
                found: "Observation".to_string()
            }
        );
        // supertypes address the resource itself
        assert!(translator
            .translate(&ExpressionNode::dotted("DomainResource.text"))
            .is_ok());
    }

    #[test]
    fn test_unreferenced_fragments_are_dropped() {
        // `as` on a choice element re-reads the parent; the COALESCE over all
        // choice keys is not needed by the result.
        let ast = ExpressionNode::dotted("Observation.value").as_type("Quantity");
        let fragments = duckdb().translate(&ast).unwrap();
        assert!(fragments
            .iter()
            .all(|f| !f.expression.contains("valueString")));
    }

    #[test]
    fn test_rows_mode_unnests_terminal() {
        let translator = Translator::with_config(
            Arc::new(PostgresDialect::new()),
            TranslatorConfig {
                dialect: DialectKind::PostgreSql,
                output_mode: OutputMode::Rows,
                ..Default::default()
            },
        );
        let fragments = translator
            .translate(&ExpressionNode::dotted("Patient.name.family"))
            .unwrap();
        let last = fragments.last().unwrap();
        assert!(last.requires_unnest);
        assert!(!last.is_aggregate);
        assert_eq!(last.expression, "item_1.value");
        assert!(last
            .meta(META_UNNEST_SOURCE)
            .unwrap()
            .contains("jsonb_array_elements"));
    }

    #[test]
    fn test_fresh_contexts_restart_naming() {
        let translator = duckdb();
        let ast = ExpressionNode::dotted("Patient.name.given").call("count", vec![]);
        let first = translator.translate(&ast).unwrap();
        let second = translator.translate(&ast).unwrap();
        assert_eq!(names(&first), names(&second));
        assert_eq!(first, second);
    }

    #[test]
    fn test_external_constant() {
        let mut config = TranslatorConfig::default();
        config
            .constants
            .insert("limit".to_string(), ConstantValue::Integer(3));
        let translator = Translator::with_config(Arc::new(DuckDbDialect::new()), config);

        let ast = ExpressionNode::dotted("Patient.name").call(
            "take",
            vec![ExpressionNode::variable("%limit")],
        );
        assert!(translator.translate(&ast).is_ok());

        let unbound = ExpressionNode::dotted("Patient.name")
            .call("take", vec![ExpressionNode::variable("%missing")]);
        assert_eq!(
            translator.translate(&unbound).unwrap_err(),
            TranslationError::UnboundVariable("%missing".to_string())
        );
    }

    #[test]
    fn test_index_outside_lambda_is_unbound() {
        let ast = ExpressionNode::identifier("Patient").call(
            "take",
            vec![ExpressionNode::variable("$index")],
        );
        assert_eq!(
            duckdb().translate(&ast).unwrap_err(),
            TranslationError::UnboundVariable("$index".to_string())
        );
    }
}
