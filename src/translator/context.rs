use std::collections::HashMap;

use crate::utils::cte_naming::{generate_cte_name, generate_item_alias};

use super::expr::SqlExpr;
use super::fragment::SqlFragment;

/// Lambda scope entered by `where()`, `select()`, `all()` and friends.
#[derive(Debug, Clone)]
struct LambdaScope {
    /// Alias of the unnested item rows
    alias: String,
    /// Focus that was active before the scope was entered
    outer_focus: Option<SqlExpr>,
}

/// Mutable state of one translation.
///
/// Created per `translate` call and never shared. The counters only grow, so
/// every fragment name and row alias is unique within the query.
#[derive(Debug)]
pub struct TranslationContext {
    /// Relation the resource is read from
    pub current_table: String,
    /// Resource type the expression is evaluated against
    pub resource_type: String,
    path_stack: Vec<String>,
    variables: HashMap<String, SqlExpr>,
    cte_prefix: String,
    cte_counter: usize,
    alias_counter: usize,
    lambdas: Vec<LambdaScope>,
    focus: Option<SqlExpr>,
    fragments: Vec<SqlFragment>,
    warnings: Vec<String>,
}

impl TranslationContext {
    pub fn new(
        current_table: impl Into<String>,
        resource_type: impl Into<String>,
        cte_prefix: impl Into<String>,
    ) -> Self {
        Self {
            current_table: current_table.into(),
            resource_type: resource_type.into(),
            path_stack: Vec::new(),
            variables: HashMap::new(),
            cte_prefix: cte_prefix.into(),
            cte_counter: 0,
            alias_counter: 0,
            lambdas: Vec::new(),
            focus: None,
            fragments: Vec::new(),
            warnings: Vec::new(),
        }
    }

    // ----- naming -----

    pub fn next_cte_name(&mut self) -> String {
        self.cte_counter += 1;
        generate_cte_name(&self.cte_prefix, self.cte_counter)
    }

    pub fn next_item_alias(&mut self) -> String {
        self.alias_counter += 1;
        generate_item_alias(self.alias_counter)
    }

    pub fn cte_counter(&self) -> usize {
        self.cte_counter
    }

    pub fn cte_prefix(&self) -> &str {
        &self.cte_prefix
    }

    // ----- fragments -----

    pub fn push_fragment(&mut self, fragment: SqlFragment) {
        log::trace!("Emitted fragment {}", fragment);
        self.fragments.push(fragment);
    }

    pub fn fragments(&self) -> &[SqlFragment] {
        &self.fragments
    }

    pub fn take_fragments(&mut self) -> Vec<SqlFragment> {
        std::mem::take(&mut self.fragments)
    }

    pub fn set_fragments(&mut self, fragments: Vec<SqlFragment>) {
        self.fragments = fragments;
    }

    // ----- paths -----

    pub fn push_path(&mut self, segment: impl Into<String>) {
        self.path_stack.push(segment.into());
    }

    pub fn pop_path(&mut self) -> Option<String> {
        self.path_stack.pop()
    }

    pub fn current_path(&self) -> String {
        self.path_stack.join(".")
    }

    // ----- variables -----

    pub fn bind_variable(&mut self, name: impl Into<String>, value: SqlExpr) {
        self.variables.insert(name.into(), value);
    }

    pub fn variable(&self, name: &str) -> Option<&SqlExpr> {
        self.variables.get(name)
    }

    // ----- focus and lambda scopes -----

    /// Value `$this` and bare identifiers resolve against, `None` at the top level.
    pub fn focus(&self) -> Option<&SqlExpr> {
        self.focus.as_ref()
    }

    /// Replace the focus, returning the previous one.
    pub fn set_focus(&mut self, focus: Option<SqlExpr>) -> Option<SqlExpr> {
        std::mem::replace(&mut self.focus, focus)
    }

    /// Enter a lambda whose item rows are exposed as `alias`; `item` becomes the focus.
    pub fn enter_lambda(&mut self, alias: impl Into<String>, item: SqlExpr) {
        let outer_focus = self.set_focus(Some(item));
        self.lambdas.push(LambdaScope {
            alias: alias.into(),
            outer_focus,
        });
    }

    pub fn exit_lambda(&mut self) {
        if let Some(scope) = self.lambdas.pop() {
            self.focus = scope.outer_focus;
        }
    }

    pub fn in_lambda(&self) -> bool {
        !self.lambdas.is_empty()
    }

    pub fn lambda_depth(&self) -> usize {
        self.lambdas.len()
    }

    /// Alias of the innermost lambda's item rows.
    pub fn lambda_alias(&self) -> Option<&str> {
        self.lambdas.last().map(|scope| scope.alias.as_str())
    }

    // ----- warnings -----

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{}", message);
        self.warnings.push(message);
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }
}
