use std::sync::LazyLock;

use regex::Regex;

use crate::fhirpath_ast::{ExpressionNode, LiteralValue};
use crate::sql_dialect::{ComparisonOp, SqlType};

use super::super::context::TranslationContext;
use super::super::errors::TranslationError;
use super::super::expr::{SqlExpr, ValueShape};
use super::super::Translator;
use super::Call;

/// `$1`-style group references in a `replaceMatches()` substitution
static GROUP_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$(\d)").expect("valid group reference regex"));

impl Translator {
    pub(super) fn string_function(
        &self,
        call: &Call<'_>,
        ctx: &mut TranslationContext,
    ) -> Result<SqlExpr, TranslationError> {
        let d = self.dialect.as_ref();
        let input = &call.input;
        let s = self.as_string(input);

        let (sql, result_type, mut parts) = match call.name {
            "upper" => (d.upper(&s.sql), SqlType::String, vec![]),
            "lower" => (d.lower(&s.sql), SqlType::String, vec![]),
            "trim" => (d.trim(&s.sql), SqlType::String, vec![]),
            "length" => (d.string_length(&s.sql), SqlType::Integer, vec![]),
            "contains" | "startsWith" | "endsWith" | "matches" | "matchesFull" => {
                let arg = self.string_argument(call, 0, ctx)?;
                let sql = match call.name {
                    "contains" => d.string_contains(&s.sql, &arg.sql),
                    "startsWith" => d.starts_with(&s.sql, &arg.sql),
                    "endsWith" => d.ends_with(&s.sql, &arg.sql),
                    "matches" => d.regex_match(&s.sql, &arg.sql, false),
                    _ => d.regex_match(&s.sql, &arg.sql, true),
                };
                (sql, SqlType::Boolean, vec![arg])
            }
            "indexOf" => {
                let needle = self.string_argument(call, 0, ctx)?;
                let sql = d.arithmetic(&d.string_position(&s.sql, &needle.sql), "-", "1");
                (sql, SqlType::Integer, vec![needle])
            }
            "substring" => {
                let (sql, args) = self.substring(call, &s, ctx)?;
                (sql, SqlType::String, args)
            }
            "replace" => {
                let pattern = self.string_argument(call, 0, ctx)?;
                let substitution = self.string_argument(call, 1, ctx)?;
                let sql = d.string_replace(&s.sql, &pattern.sql, &substitution.sql);
                (sql, SqlType::String, vec![pattern, substitution])
            }
            "replaceMatches" => {
                let pattern = self.string_argument(call, 0, ctx)?;
                let substitution = match call.args.get(1) {
                    Some(ExpressionNode::Literal {
                        value: LiteralValue::String(text),
                    }) => SqlExpr::constant(
                        d.string_literal(&GROUP_REFERENCE.replace_all(text, r"\${1}")),
                        SqlType::String,
                        call.path.as_str(),
                    ),
                    _ => self.string_argument(call, 1, ctx)?,
                };
                let sql = d.regex_replace(&s.sql, &pattern.sql, &substitution.sql);
                (sql, SqlType::String, vec![pattern, substitution])
            }
            "join" => return self.join_strings(call, ctx),
            other => return Err(call.invalid(format!("'{}' is not a string function", other))),
        };

        parts.insert(0, input.clone());
        let refs: Vec<&SqlExpr> = parts.iter().collect();
        Ok(SqlExpr::composite(
            sql,
            ValueShape::Native(result_type),
            &refs,
            call.path.as_str(),
        ))
    }

    fn string_argument(
        &self,
        call: &Call<'_>,
        index: usize,
        ctx: &mut TranslationContext,
    ) -> Result<SqlExpr, TranslationError> {
        let arg = self.argument(call, index, ctx)?;
        Ok(self.as_string(&arg))
    }

    /// `substring(start[, length])` with a 0-based start; a start outside the
    /// string gives empty and a negative length gives `''`.
    fn substring(
        &self,
        call: &Call<'_>,
        s: &SqlExpr,
        ctx: &mut TranslationContext,
    ) -> Result<(String, Vec<SqlExpr>), TranslationError> {
        let d = self.dialect.as_ref();
        let start = self.argument(call, 0, ctx)?;
        let start = self.as_native(&start, SqlType::Integer);
        let out_of_range = d.or(
            &d.comparison(&start.sql, ComparisonOp::Lt, "0"),
            &d.comparison(&start.sql, ComparisonOp::GtEq, &d.string_length(&s.sql)),
        );
        let from = d.arithmetic(&start.sql, "+", "1");

        let (value, mut args) = match call.args.len() {
            1 => (d.substring(&s.sql, &from, None), vec![]),
            _ => {
                let length = self.argument(call, 1, ctx)?;
                let length = self.as_native(&length, SqlType::Integer);
                let clamped = d.case_when(
                    &[(
                        d.comparison(&length.sql, ComparisonOp::Lt, "0"),
                        "0".to_string(),
                    )],
                    Some(&length.sql),
                );
                (d.substring(&s.sql, &from, Some(&clamped)), vec![length])
            }
        };
        let sql = d.case_when(&[(out_of_range, "NULL".to_string())], Some(&value));
        args.insert(0, start);
        Ok((sql, args))
    }

    /// `join([separator])`: the items' text, in order.
    fn join_strings(
        &self,
        call: &Call<'_>,
        ctx: &mut TranslationContext,
    ) -> Result<SqlExpr, TranslationError> {
        let d = self.dialect.as_ref();
        let separator = if call.args.is_empty() {
            SqlExpr::constant(d.string_literal(""), SqlType::String, "''")
        } else {
            self.string_argument(call, 0, ctx)?
        };
        let alias = ctx.next_item_alias();
        let item = self.as_string(&SqlExpr::item(&alias, None));
        let aggregate = d.string_agg(&item.sql, &separator.sql, Some(&Self::ordinal(&alias)));

        Ok(self.collection_subquery(
            &call.input,
            &alias,
            &aggregate,
            None,
            &[&separator],
            ValueShape::Native(SqlType::String),
            None,
            &call.path,
            ctx,
        ))
    }
}
