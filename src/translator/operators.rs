use crate::fhirpath_ast::{BinaryOperator, ExpressionNode, LiteralValue, Polarity};
use crate::sql_dialect::{ComparisonOp, SqlType};
use crate::type_registry::choice_key;

use super::context::TranslationContext;
use super::errors::TranslationError;
use super::expr::{scalar_type_of, SqlExpr, ValueShape};
use super::Translator;

/// Common scalar type two operands are compared in.
fn unify_types(left: Option<SqlType>, right: Option<SqlType>) -> SqlType {
    match (left, right) {
        (Some(l), Some(r)) if l == r => l,
        (Some(l), Some(r)) if l.is_numeric() && r.is_numeric() => SqlType::Decimal,
        (Some(SqlType::Date), Some(SqlType::DateTime))
        | (Some(SqlType::DateTime), Some(SqlType::Date)) => SqlType::DateTime,
        (Some(known), None) | (None, Some(known)) => known,
        _ => SqlType::String,
    }
}

/// Values of the two types can be compared without a failing conversion.
fn comparable(a: SqlType, b: SqlType) -> bool {
    a == b
        || (a.is_numeric() && b.is_numeric())
        || matches!(
            (a, b),
            (SqlType::Date, SqlType::DateTime) | (SqlType::DateTime, SqlType::Date)
        )
}

impl Translator {
    pub(super) fn visit_binary(
        &self,
        operator: BinaryOperator,
        left: &ExpressionNode,
        right: &ExpressionNode,
        node: &ExpressionNode,
        ctx: &mut TranslationContext,
    ) -> Result<SqlExpr, TranslationError> {
        let l = self.visit(left, ctx)?;
        let r = self.visit(right, ctx)?;
        let path = node.to_string();

        let (l, r) = if operator.is_comparison() {
            (
                self.narrow_choice(&l, r.scalar_type())?,
                self.narrow_choice(&r, l.scalar_type())?,
            )
        } else {
            (l, r)
        };

        match operator {
            BinaryOperator::Equal => Ok(self.compare(&l, ComparisonOp::Eq, &r, path)),
            BinaryOperator::NotEqual => Ok(self.compare(&l, ComparisonOp::NotEq, &r, path)),
            BinaryOperator::LessThan => self.ordered_compare(&l, ComparisonOp::Lt, &r, path),
            BinaryOperator::LessOrEqual => self.ordered_compare(&l, ComparisonOp::LtEq, &r, path),
            BinaryOperator::GreaterThan => self.ordered_compare(&l, ComparisonOp::Gt, &r, path),
            BinaryOperator::GreaterOrEqual => {
                self.ordered_compare(&l, ComparisonOp::GtEq, &r, path)
            }
            BinaryOperator::Equivalent => Ok(self.equivalent(&l, &r, false, path)),
            BinaryOperator::NotEquivalent => Ok(self.equivalent(&l, &r, true, path)),
            BinaryOperator::Add
            | BinaryOperator::Subtract
            | BinaryOperator::Multiply
            | BinaryOperator::Divide
            | BinaryOperator::Div
            | BinaryOperator::Mod => self.arithmetic(operator, &l, &r, path),
            BinaryOperator::Concatenate => Ok(self.concatenate(&l, &r, path)),
            BinaryOperator::And
            | BinaryOperator::Or
            | BinaryOperator::Xor
            | BinaryOperator::Implies => self.logic(operator, &l, &r, path),
            BinaryOperator::In => Ok(self.membership(&l, &r, path)),
            BinaryOperator::Contains => Ok(self.membership(&r, &l, path)),
        }
    }

    /// A choice element compared with a value of type `other` keeps only its
    /// concrete elements of a comparable type.
    fn narrow_choice(
        &self,
        operand: &SqlExpr,
        other: Option<SqlType>,
    ) -> Result<SqlExpr, TranslationError> {
        let (Some(choice), Some(other)) = (&operand.choice, other) else {
            return Ok(operand.clone());
        };
        let keys: Vec<String> = choice
            .types
            .iter()
            .filter(|t| scalar_type_of(t).map_or(false, |t| comparable(t, other)))
            .map(|t| choice_key(&choice.element, t))
            .collect();
        if keys.len() == choice.types.len() {
            return Ok(operand.clone());
        }
        if keys.is_empty() {
            return Ok(SqlExpr::empty(operand.path.clone()));
        }
        log::debug!("comparing '{}' through {}", operand.path, keys.join(", "));
        let narrowed = self.choice_elements(choice, &keys, &operand.path)?;
        Ok(self.as_singleton(&narrowed).with_path(operand.path.clone()))
    }

    /// Both operands as singleton scalars of their common type.
    fn unified_scalars(&self, l: &SqlExpr, r: &SqlExpr) -> (SqlExpr, SqlExpr, SqlType) {
        let target = unify_types(l.scalar_type(), r.scalar_type());
        let (l, r) = if target == SqlType::String {
            (self.as_string(l), self.as_string(r))
        } else {
            (self.as_native(l, target), self.as_native(r, target))
        };
        (l, r, target)
    }

    fn compare(&self, l: &SqlExpr, op: ComparisonOp, r: &SqlExpr, path: String) -> SqlExpr {
        let (ls, rs, _) = self.unified_scalars(l, r);
        let sql = self.dialect.comparison(&ls.sql, op, &rs.sql);
        SqlExpr::composite(sql, ValueShape::Native(SqlType::Boolean), &[l, r], path)
    }

    fn ordered_compare(
        &self,
        l: &SqlExpr,
        op: ComparisonOp,
        r: &SqlExpr,
        path: String,
    ) -> Result<SqlExpr, TranslationError> {
        if l.scalar_type() == Some(SqlType::Boolean) || r.scalar_type() == Some(SqlType::Boolean) {
            return Err(TranslationError::invalid_operand(
                op.symbol(),
                path,
                "Boolean values are not ordered",
            ));
        }
        Ok(self.compare(l, op, r, path))
    }

    /// `~`: two empties are equivalent, one empty is not; strings compare
    /// ignoring case and surrounding whitespace.
    fn equivalent(&self, l: &SqlExpr, r: &SqlExpr, negate: bool, path: String) -> SqlExpr {
        let d = self.dialect.as_ref();
        let (ls, rs, target) = self.unified_scalars(l, r);
        let (lv, rv) = if target == SqlType::String {
            (d.lower(&d.trim(&ls.sql)), d.lower(&d.trim(&rs.sql)))
        } else {
            (ls.sql.clone(), rs.sql.clone())
        };

        let sql = d.case_when(
            &[
                (
                    d.and(&d.is_null(&ls.sql), &d.is_null(&rs.sql)),
                    d.boolean_literal(true),
                ),
                (
                    d.or(&d.is_null(&ls.sql), &d.is_null(&rs.sql)),
                    d.boolean_literal(false),
                ),
            ],
            Some(&d.comparison(&lv, ComparisonOp::Eq, &rv)),
        );
        let sql = if negate { d.not(&sql) } else { sql };
        SqlExpr::composite(sql, ValueShape::Native(SqlType::Boolean), &[l, r], path)
    }

    fn arithmetic(
        &self,
        operator: BinaryOperator,
        l: &SqlExpr,
        r: &SqlExpr,
        path: String,
    ) -> Result<SqlExpr, TranslationError> {
        let d = self.dialect.as_ref();
        let (lt, rt) = (l.scalar_type(), r.scalar_type());

        for t in [lt, rt].into_iter().flatten() {
            if t == SqlType::Boolean || t.is_temporal() {
                return Err(TranslationError::invalid_operand(
                    operator.symbol(),
                    path,
                    format!("{} operands are not supported", t.system_type()),
                ));
            }
        }

        if operator == BinaryOperator::Add
            && (lt == Some(SqlType::String) || rt == Some(SqlType::String))
        {
            let (ls, rs) = (self.as_string(l), self.as_string(r));
            let sql = d.concat(&ls.sql, &rs.sql);
            return Ok(SqlExpr::composite(
                sql,
                ValueShape::Native(SqlType::String),
                &[l, r],
                path,
            ));
        }
        if lt == Some(SqlType::String) || rt == Some(SqlType::String) {
            return Err(TranslationError::invalid_operand(
                operator.symbol(),
                path,
                "String operands only support '+'",
            ));
        }

        let both_integer = lt == Some(SqlType::Integer) && rt == Some(SqlType::Integer);
        let operand_type = if both_integer {
            SqlType::Integer
        } else {
            SqlType::Decimal
        };
        let ls = self.as_native(l, operand_type);
        let rs = self.as_native(r, operand_type);

        let (sql, result_type) = match operator {
            BinaryOperator::Add | BinaryOperator::Subtract | BinaryOperator::Multiply
                if both_integer =>
            {
                return Ok(self.checked_integer_arithmetic(operator, l, r, &ls, &rs, path));
            }
            BinaryOperator::Add => (d.arithmetic(&ls.sql, "+", &rs.sql), operand_type),
            BinaryOperator::Subtract => (d.arithmetic(&ls.sql, "-", &rs.sql), operand_type),
            BinaryOperator::Multiply => (d.arithmetic(&ls.sql, "*", &rs.sql), operand_type),
            BinaryOperator::Divide => {
                let ld = self.as_native(l, SqlType::Decimal);
                let rd = self.as_native(r, SqlType::Decimal);
                (
                    d.arithmetic(&ld.sql, "/", &d.nullif(&rd.sql, "0")),
                    SqlType::Decimal,
                )
            }
            BinaryOperator::Div => (
                d.integer_divide(&ls.sql, &d.nullif(&rs.sql, "0")),
                SqlType::Integer,
            ),
            BinaryOperator::Mod => (d.modulo(&ls.sql, &d.nullif(&rs.sql, "0")), operand_type),
            other => {
                return Err(TranslationError::invalid_operand(
                    other.symbol(),
                    path,
                    "not an arithmetic operator",
                ))
            }
        };
        Ok(SqlExpr::composite(
            sql,
            ValueShape::Native(result_type),
            &[l, r],
            path,
        ))
    }

    /// Integer `+`, `-` or `*`, empty when the result leaves the BIGINT
    /// range. Two literals are computed here; anything else is computed in a
    /// wider type and range checked.
    fn checked_integer_arithmetic(
        &self,
        operator: BinaryOperator,
        l: &SqlExpr,
        r: &SqlExpr,
        ls: &SqlExpr,
        rs: &SqlExpr,
        path: String,
    ) -> SqlExpr {
        let d = self.dialect.as_ref();
        let symbol = operator.symbol();
        let result = |sql: String| {
            SqlExpr::composite(sql, ValueShape::Native(SqlType::Integer), &[l, r], path.clone())
        };

        if let (Some(LiteralValue::Integer(a)), Some(LiteralValue::Integer(b))) =
            (&l.literal, &r.literal)
        {
            let folded = match operator {
                BinaryOperator::Add => a.checked_add(*b),
                BinaryOperator::Subtract => a.checked_sub(*b),
                _ => a.checked_mul(*b),
            };
            return match folded {
                Some(value) => result(d.arithmetic(&ls.sql, symbol, &rs.sql))
                    .with_literal(LiteralValue::Integer(value)),
                None => {
                    log::debug!("'{}' overflows a 64-bit integer", path);
                    SqlExpr::constant(
                        d.typed_null(SqlType::Integer),
                        SqlType::Integer,
                        path.clone(),
                    )
                }
            };
        }

        let wide = d.arithmetic(
            &d.widen_integer(&ls.sql),
            symbol,
            &d.widen_integer(&rs.sql),
        );
        let out_of_range = d.or(
            &d.comparison(&wide, ComparisonOp::Lt, &d.integer_literal(i64::MIN)),
            &d.comparison(&wide, ComparisonOp::Gt, &d.integer_literal(i64::MAX)),
        );
        result(d.case_when(
            &[(out_of_range, "NULL".to_string())],
            Some(&d.cast(&wide, SqlType::Integer)),
        ))
    }

    /// `&`: empty operands read as ''.
    fn concatenate(&self, l: &SqlExpr, r: &SqlExpr, path: String) -> SqlExpr {
        let d = self.dialect.as_ref();
        let empty = d.string_literal("");
        let ls = d.coalesce(&[self.as_string(l).sql, empty.clone()]);
        let rs = d.coalesce(&[self.as_string(r).sql, empty]);
        SqlExpr::composite(
            d.concat(&ls, &rs),
            ValueShape::Native(SqlType::String),
            &[l, r],
            path,
        )
    }

    /// Three-valued boolean logic; SQL NULL plays the empty collection.
    fn logic(
        &self,
        operator: BinaryOperator,
        l: &SqlExpr,
        r: &SqlExpr,
        path: String,
    ) -> Result<SqlExpr, TranslationError> {
        let d = self.dialect.as_ref();
        let lb = self.as_boolean(l, operator.symbol())?;
        let rb = self.as_boolean(r, operator.symbol())?;

        let sql = match operator {
            BinaryOperator::And => d.and(&lb.sql, &rb.sql),
            BinaryOperator::Or => d.or(&lb.sql, &rb.sql),
            BinaryOperator::Xor => d.case_when(
                &[(
                    d.or(&d.is_null(&lb.sql), &d.is_null(&rb.sql)),
                    "NULL".to_string(),
                )],
                Some(&d.comparison(&lb.sql, ComparisonOp::NotEq, &rb.sql)),
            ),
            BinaryOperator::Implies => d.or(&d.not(&lb.sql), &rb.sql),
            other => {
                return Err(TranslationError::invalid_operand(
                    other.symbol(),
                    path,
                    "not a boolean operator",
                ))
            }
        };
        Ok(SqlExpr::composite(
            sql,
            ValueShape::Native(SqlType::Boolean),
            &[l, r],
            path,
        ))
    }

    /// `item in collection`: empty item gives empty, empty collection gives false.
    fn membership(&self, item: &SqlExpr, collection: &SqlExpr, path: String) -> SqlExpr {
        let d = self.dialect.as_ref();
        let single = self.as_json_item(item);
        let array = self.as_collection(collection);
        let sql = d.case_when(
            &[(d.is_null(&single.sql), "NULL".to_string())],
            Some(&d.coalesce(&[
                d.json_array_contains(&array.sql, &single.sql),
                d.boolean_literal(false),
            ])),
        );
        SqlExpr::composite(
            sql,
            ValueShape::Native(SqlType::Boolean),
            &[item, collection],
            path,
        )
    }

    /// Concatenation of two collections, keeping duplicates.
    pub(crate) fn combine_collections(
        &self,
        l: &SqlExpr,
        r: &SqlExpr,
        path: String,
    ) -> SqlExpr {
        let sql = self
            .dialect
            .json_array_concat(&self.collection_or_empty(l), &self.collection_or_empty(r));
        let fhir_type = if l.fhir_type == r.fhir_type {
            l.fhir_type.clone()
        } else {
            None
        };
        SqlExpr::composite(sql, ValueShape::JsonArray, &[l, r], path).with_type(fhir_type)
    }

    /// `|`: concatenation with duplicates removed.
    pub(crate) fn union_collections(
        &self,
        l: &SqlExpr,
        r: &SqlExpr,
        path: String,
        ctx: &mut TranslationContext,
    ) -> SqlExpr {
        let combined = self.combine_collections(l, r, path.clone());
        let alias = ctx.next_item_alias();
        let aggregate = self
            .dialect
            .json_array_agg(&SqlExpr::item(&alias, None).sql, None, true);
        let fhir_type = combined.fhir_type.clone();
        self.collection_subquery(
            &combined,
            &alias,
            &aggregate,
            None,
            &[],
            ValueShape::JsonArray,
            fhir_type,
            &path,
            ctx,
        )
    }

    pub(super) fn visit_union(
        &self,
        left: &ExpressionNode,
        right: &ExpressionNode,
        node: &ExpressionNode,
        ctx: &mut TranslationContext,
    ) -> Result<SqlExpr, TranslationError> {
        let l = self.visit(left, ctx)?;
        let r = self.visit(right, ctx)?;
        Ok(self.union_collections(&l, &r, node.to_string(), ctx))
    }

    pub(super) fn visit_indexer(
        &self,
        base: &ExpressionNode,
        index: &ExpressionNode,
        node: &ExpressionNode,
        ctx: &mut TranslationContext,
    ) -> Result<SqlExpr, TranslationError> {
        let collection = self.visit(base, ctx)?;
        let index = self.visit(index, ctx)?;
        match index.scalar_type() {
            None | Some(SqlType::Integer) => {}
            Some(other) => {
                return Err(TranslationError::invalid_operand(
                    "[]",
                    node.to_string(),
                    format!("index must be an Integer, found {}", other.system_type()),
                ))
            }
        }
        Ok(self.element_at(&collection, &index, node.to_string()))
    }

    /// Item `index` (0-based) of a collection, empty when out of range.
    pub(crate) fn element_at(&self, collection: &SqlExpr, index: &SqlExpr, path: String) -> SqlExpr {
        let d = self.dialect.as_ref();
        let array = self.as_collection(collection);
        let idx = self.as_native(index, SqlType::Integer);
        let in_range = d.and(
            &d.comparison(&idx.sql, ComparisonOp::GtEq, "0"),
            &d.comparison(&idx.sql, ComparisonOp::Lt, &self.item_count(&array)),
        );
        let sql = d.case_when(
            &[(in_range, d.json_array_element(&array.sql, &idx.sql))],
            None,
        );
        SqlExpr::composite(sql, ValueShape::Json, &[collection, index], path)
            .with_type(collection.fhir_type.clone())
    }

    pub(super) fn visit_unary(
        &self,
        polarity: Polarity,
        operand: &ExpressionNode,
        node: &ExpressionNode,
        ctx: &mut TranslationContext,
    ) -> Result<SqlExpr, TranslationError> {
        let d = self.dialect.as_ref();
        let path = node.to_string();

        if polarity == Polarity::Minus {
            if let ExpressionNode::Literal { value } = operand {
                match value {
                    LiteralValue::Integer(i) => {
                        let negated = i.checked_neg().ok_or_else(|| {
                            TranslationError::UnsupportedLiteral {
                                literal_type: "integer",
                                value: format!("-{}", i),
                                reason: "out of range".to_string(),
                            }
                        })?;
                        return Ok(SqlExpr::constant(
                            d.integer_literal(negated),
                            SqlType::Integer,
                            path,
                        )
                        .with_literal(LiteralValue::Integer(negated)));
                    }
                    LiteralValue::Decimal(text) => {
                        let negated = match text.strip_prefix('-') {
                            Some(positive) => positive.to_string(),
                            None => format!("-{}", text.trim_start_matches('+')),
                        };
                        return Ok(SqlExpr::constant(
                            d.decimal_literal(&negated),
                            SqlType::Decimal,
                            path,
                        )
                        .with_literal(LiteralValue::Decimal(negated)));
                    }
                    _ => {}
                }
            }
        }

        let value = self.visit(operand, ctx)?;
        match value.scalar_type() {
            Some(t) if !t.is_numeric() => {
                return Err(TranslationError::invalid_operand(
                    match polarity {
                        Polarity::Plus => "unary +",
                        Polarity::Minus => "unary -",
                    },
                    path,
                    format!("expected a number, found {}", t.system_type()),
                ))
            }
            _ => {}
        }
        let scalar = self.as_scalar(&value, SqlType::Decimal);
        match polarity {
            Polarity::Plus => Ok(scalar.with_path(path)),
            Polarity::Minus => {
                let sql = d.arithmetic("0", "-", &scalar.sql);
                Ok(SqlExpr::composite(sql, scalar.shape, &[&value], path))
            }
        }
    }
}
