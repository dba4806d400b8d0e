//! DuckDB spelling of the dialect primitives.
//!
//! JSON values use DuckDB's `JSON` type. Arrays are unnested by casting to
//! `JSON[]`; aggregations build lists and convert them back with `to_json`.

use super::{
    AggregateFunction, ComparisonOp, Dialect, DialectKind, JsonPath, MathFunction, SqlType,
};
use crate::type_registry::TypeEntry;

#[derive(Debug, Clone, Copy, Default)]
pub struct DuckDbDialect;

impl DuckDbDialect {
    pub fn new() -> Self {
        Self
    }

    fn type_name(sql_type: SqlType) -> &'static str {
        match sql_type {
            SqlType::String => "VARCHAR",
            SqlType::Integer => "BIGINT",
            SqlType::Decimal => "DOUBLE",
            SqlType::Boolean => "BOOLEAN",
            SqlType::Date => "DATE",
            SqlType::DateTime => "TIMESTAMPTZ",
            SqlType::Time => "TIME",
        }
    }

    fn as_list(json: &str) -> String {
        format!("CAST({} AS JSON[])", json)
    }

    fn path_literal(path: &JsonPath) -> String {
        format!("'{}'", path.to_json_path_text())
    }
}

impl Dialect for DuckDbDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::DuckDb
    }

    fn name(&self) -> &'static str {
        "DuckDB"
    }

    fn string_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    fn integer_literal(&self, value: i64) -> String {
        if value < 0 {
            format!("({})", value)
        } else {
            value.to_string()
        }
    }

    fn decimal_literal(&self, text: &str) -> String {
        format!("CAST({} AS DOUBLE)", text)
    }

    fn boolean_literal(&self, value: bool) -> String {
        let literal = if value { "TRUE" } else { "FALSE" };
        literal.to_string()
    }

    fn date_literal(&self, text: &str) -> String {
        format!("DATE '{}'", text)
    }

    fn datetime_literal(&self, text: &str) -> String {
        format!("TIMESTAMPTZ '{}'", text)
    }

    fn time_literal(&self, text: &str) -> String {
        format!("TIME '{}'", text)
    }

    fn typed_null(&self, sql_type: SqlType) -> String {
        format!("CAST(NULL AS {})", Self::type_name(sql_type))
    }

    fn json_extract(&self, json: &str, path: &JsonPath) -> String {
        if path.is_empty() {
            return json.to_string();
        }
        let extracted = format!("json_extract({}, {})", json, Self::path_literal(path));
        if path.has_wildcard() {
            // wildcard extraction yields JSON[]
            format!("to_json({})", extracted)
        } else {
            extracted
        }
    }

    fn json_to_native(&self, json: &str, sql_type: SqlType) -> String {
        let text = self.json_text(json);
        match sql_type {
            SqlType::String => text,
            other => format!("TRY_CAST({} AS {})", text, Self::type_name(other)),
        }
    }

    fn to_json(&self, expr: &str) -> String {
        format!("to_json({})", expr)
    }

    fn json_text(&self, json: &str) -> String {
        format!("json_extract_string({}, '$')", json)
    }

    fn json_array_length(&self, json: &str) -> String {
        format!("json_array_length({})", json)
    }

    fn json_array_element(&self, json: &str, index: &str) -> String {
        match index.trim().parse::<i64>() {
            Ok(i) if i >= 0 => format!("json_extract({}, '$[{}]')", json, i),
            _ => format!("json_extract({}, '$[' || CAST({} AS VARCHAR) || ']')", json, index),
        }
    }

    fn json_build_array(&self, items: &[String]) -> String {
        format!("json_array({})", items.join(", "))
    }

    fn empty_json_array(&self) -> String {
        "CAST('[]' AS JSON)".to_string()
    }

    fn json_array_concat(&self, left: &str, right: &str) -> String {
        format!(
            "to_json(list_concat({}, {}))",
            Self::as_list(left),
            Self::as_list(right)
        )
    }

    fn json_array_contains(&self, array: &str, item: &str) -> String {
        format!(
            "list_contains({}, CAST({} AS JSON))",
            Self::as_list(array),
            item
        )
    }

    fn json_array_slice(&self, array: &str, start: &str, end: Option<&str>) -> String {
        let list = Self::as_list(array);
        let end = match end {
            Some(end) => end.to_string(),
            None => format!("len({})", list),
        };
        format!("to_json(list_slice({}, ({}) + 1, {}))", list, start, end)
    }

    fn json_is_array(&self, json: &str) -> String {
        format!("(json_type({}) = 'ARRAY')", json)
    }

    fn json_type_check(&self, json: &str, entry: &TypeEntry) -> Option<String> {
        let rendering = entry.renderings.duckdb?;
        let tags: Vec<String> = rendering
            .json_types
            .iter()
            .map(|t| self.string_literal(t))
            .collect();
        let tag_check = format!("(json_type({}) IN ({}))", json, tags.join(", "));
        Some(match rendering.text_pattern {
            Some(pattern) => format!(
                "({} AND regexp_matches({}, {}))",
                tag_check,
                self.json_text(json),
                self.string_literal(pattern)
            ),
            None => tag_check,
        })
    }

    fn unnest_json_array(&self, array: &str, alias: &str) -> String {
        let list = Self::as_list(array);
        format!(
            "(SELECT unnest({list}) AS value, generate_subscripts({list}, 1) - 1 AS ordinal) AS {alias}",
            list = list,
            alias = alias
        )
    }

    fn json_array_agg(&self, value: &str, order_by: Option<&str>, distinct: bool) -> String {
        match (distinct, order_by) {
            (true, _) => format!("to_json(list(DISTINCT {}))", value),
            (false, Some(order)) => format!("to_json(list({} ORDER BY {}))", value, order),
            (false, None) => format!("to_json(list({}))", value),
        }
    }

    fn json_array_flatten_agg(&self, value: &str, order_by: Option<&str>) -> String {
        let order = order_by
            .map(|o| format!(" ORDER BY {}", o))
            .unwrap_or_default();
        format!(
            "to_json(flatten(list({}{}) FILTER (WHERE {} IS NOT NULL)))",
            Self::as_list(value),
            order,
            value
        )
    }

    fn aggregate(&self, function: AggregateFunction, expr: &str, filter: Option<&str>) -> String {
        let name = match function {
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
            AggregateFunction::Avg => "avg",
            AggregateFunction::BoolAnd => "bool_and",
            AggregateFunction::BoolOr => "bool_or",
        };
        match filter {
            Some(filter) => format!("{}({}) FILTER (WHERE {})", name, expr, filter),
            None => format!("{}({})", name, expr),
        }
    }

    fn string_agg(&self, expr: &str, separator: &str, order_by: Option<&str>) -> String {
        match order_by {
            Some(order) => format!("string_agg({}, {} ORDER BY {})", expr, separator, order),
            None => format!("string_agg({}, {})", expr, separator),
        }
    }

    fn concat(&self, left: &str, right: &str) -> String {
        format!("({} || {})", left, right)
    }

    fn substring(&self, expr: &str, start: &str, length: Option<&str>) -> String {
        match length {
            Some(length) => format!("substring({}, {}, {})", expr, start, length),
            None => format!("substring({}, {})", expr, start),
        }
    }

    fn string_position(&self, haystack: &str, needle: &str) -> String {
        format!("instr({}, {})", haystack, needle)
    }

    fn string_length(&self, expr: &str) -> String {
        format!("length({})", expr)
    }

    fn upper(&self, expr: &str) -> String {
        format!("upper({})", expr)
    }

    fn lower(&self, expr: &str) -> String {
        format!("lower({})", expr)
    }

    fn trim(&self, expr: &str) -> String {
        format!("trim({})", expr)
    }

    fn starts_with(&self, expr: &str, prefix: &str) -> String {
        format!("starts_with({}, {})", expr, prefix)
    }

    fn ends_with(&self, expr: &str, suffix: &str) -> String {
        format!("ends_with({}, {})", expr, suffix)
    }

    fn string_contains(&self, expr: &str, needle: &str) -> String {
        format!("contains({}, {})", expr, needle)
    }

    fn string_replace(&self, expr: &str, pattern: &str, substitution: &str) -> String {
        format!("replace({}, {}, {})", expr, pattern, substitution)
    }

    fn regex_match(&self, expr: &str, pattern: &str, full: bool) -> String {
        if full {
            format!("regexp_full_match({}, {})", expr, pattern)
        } else {
            format!("regexp_matches({}, {})", expr, pattern)
        }
    }

    fn regex_replace(&self, expr: &str, pattern: &str, substitution: &str) -> String {
        format!("regexp_replace({}, {}, {}, 'g')", expr, pattern, substitution)
    }

    fn cast(&self, expr: &str, sql_type: SqlType) -> String {
        format!("CAST({} AS {})", expr, Self::type_name(sql_type))
    }

    fn try_cast_text(&self, text: &str, sql_type: SqlType) -> String {
        match sql_type {
            SqlType::String => text.to_string(),
            other => format!("TRY_CAST({} AS {})", text, Self::type_name(other)),
        }
    }

    fn math_function(&self, function: MathFunction, expr: &str) -> String {
        let name = match function {
            MathFunction::Abs => "abs",
            MathFunction::Ceiling => "ceil",
            MathFunction::Floor => "floor",
            MathFunction::Truncate => "trunc",
            MathFunction::Sqrt => "sqrt",
            MathFunction::Exp => "exp",
            MathFunction::Ln => "ln",
        };
        format!("{}({})", name, expr)
    }

    fn power(&self, base: &str, exponent: &str) -> String {
        format!("pow({}, {})", base, exponent)
    }

    fn log(&self, value: &str, base: &str) -> String {
        format!("(ln({}) / ln({}))", value, base)
    }

    fn round(&self, expr: &str, precision: &str) -> String {
        format!("round({}, {})", expr, precision)
    }

    fn is_finite(&self, expr: &str) -> String {
        format!("isfinite({})", expr)
    }

    fn integer_divide(&self, left: &str, right: &str) -> String {
        format!("CAST(trunc({} / {}) AS BIGINT)", left, right)
    }

    fn modulo(&self, left: &str, right: &str) -> String {
        format!("({} % {})", left, right)
    }

    fn widen_integer(&self, expr: &str) -> String {
        format!("CAST({} AS HUGEINT)", expr)
    }

    fn arithmetic(&self, left: &str, operator: &str, right: &str) -> String {
        format!("({} {} {})", left, operator, right)
    }

    fn comparison(&self, left: &str, op: ComparisonOp, right: &str) -> String {
        format!("({} {} {})", left, op.symbol(), right)
    }

    fn and(&self, left: &str, right: &str) -> String {
        format!("({} AND {})", left, right)
    }

    fn or(&self, left: &str, right: &str) -> String {
        format!("({} OR {})", left, right)
    }

    fn not(&self, expr: &str) -> String {
        format!("(NOT {})", expr)
    }

    fn is_null(&self, expr: &str) -> String {
        format!("({} IS NULL)", expr)
    }

    fn is_not_null(&self, expr: &str) -> String {
        format!("({} IS NOT NULL)", expr)
    }

    fn case_when(&self, branches: &[(String, String)], otherwise: Option<&str>) -> String {
        let mut sql = String::from("CASE");
        for (condition, value) in branches {
            sql.push_str(&format!(" WHEN {} THEN {}", condition, value));
        }
        if let Some(otherwise) = otherwise {
            sql.push_str(&format!(" ELSE {}", otherwise));
        }
        sql.push_str(" END");
        sql
    }

    fn coalesce(&self, exprs: &[String]) -> String {
        format!("COALESCE({})", exprs.join(", "))
    }

    fn nullif(&self, expr: &str, value: &str) -> String {
        format!("NULLIF({}, {})", expr, value)
    }

    fn in_list(&self, expr: &str, items: &[String]) -> String {
        format!("({} IN ({}))", expr, items.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_registry::TYPE_REGISTRY;

    #[test]
    fn test_literals() {
        let d = DuckDbDialect::new();
        assert_eq!(d.string_literal("O'Brien"), "'O''Brien'");
        assert_eq!(d.integer_literal(-3), "(-3)");
        assert_eq!(d.date_literal("2020-01-01"), "DATE '2020-01-01'");
        assert_eq!(
            d.datetime_literal("2020-01-01T10:00:00Z"),
            "TIMESTAMPTZ '2020-01-01T10:00:00Z'"
        );
    }

    #[test]
    fn test_integer_widening_uses_hugeint() {
        assert_eq!(DuckDbDialect::new().widen_integer("x"), "CAST(x AS HUGEINT)");
    }

    #[test]
    fn test_json_extract_wildcard_becomes_array() {
        let d = DuckDbDialect::new();
        let simple = JsonPath::new().field("birthDate");
        assert_eq!(
            d.json_extract("patient.resource", &simple),
            "json_extract(patient.resource, '$.birthDate')"
        );
        let wildcard = JsonPath::new().field("name").wildcard();
        assert_eq!(
            d.json_extract("patient.resource", &wildcard),
            "to_json(json_extract(patient.resource, '$.name[*]'))"
        );
    }

    #[test]
    fn test_unnest_exposes_zero_based_ordinal() {
        let sql = DuckDbDialect::new().unnest_json_array("c.value", "item");
        assert!(sql.contains("unnest(CAST(c.value AS JSON[])) AS value"));
        assert!(sql.contains("- 1 AS ordinal"));
        assert!(sql.ends_with("AS item"));
    }

    #[test]
    fn test_type_check_uses_json_type_tags() {
        let d = DuckDbDialect::new();
        let integer = TYPE_REGISTRY.resolve("System.Integer").unwrap();
        assert_eq!(
            d.json_type_check("x", integer).unwrap(),
            "(json_type(x) IN ('BIGINT', 'UBIGINT'))"
        );
        let date = TYPE_REGISTRY.resolve("date").unwrap();
        let check = d.json_type_check("x", date).unwrap();
        assert!(check.contains("regexp_matches(json_extract_string(x, '$')"));

        let human_name = TYPE_REGISTRY.resolve("HumanName").unwrap();
        assert!(d.json_type_check("x", human_name).is_none());
    }

    #[test]
    fn test_array_element_dynamic_index() {
        let d = DuckDbDialect::new();
        assert_eq!(d.json_array_element("a", "0"), "json_extract(a, '$[0]')");
        assert_eq!(
            d.json_array_element("a", "n - 1"),
            "json_extract(a, '$[' || CAST(n - 1 AS VARCHAR) || ']')"
        );
    }
}
