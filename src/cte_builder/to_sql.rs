//! Rendering of fragments into `WITH` clauses.

use crate::translator::{SqlFragment, META_FILTER, META_UNNEST_SOURCE};

use super::errors::CteBuildError;

/// Output column holding the resource row id
pub const ID_COLUMN: &str = "id";
/// Output column holding the fragment's value
pub const VALUE_COLUMN: &str = "value";

pub trait ToSql {
    fn to_sql(&self) -> String;
}

/// A relation a fragment selects from or joins, with the column holding its row id.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationRef {
    pub name: String,
    pub id_column: String,
}

impl RelationRef {
    fn id(&self) -> String {
        format!("{}.{}", self.name, self.id_column)
    }
}

/// How a fragment turns its source rows into values.
#[derive(Debug, Clone, PartialEq)]
pub enum CteBody {
    /// One value per source row
    Scalar { expression: String },
    /// Items expanded from the source row and aggregated back into one value
    Aggregate {
        expression: String,
        unnest_source: String,
        filter: Option<String>,
    },
    /// One row per expanded item
    Rows {
        expression: String,
        unnest_source: String,
        filter: Option<String>,
    },
}

impl CteBody {
    pub fn from_fragment(fragment: &SqlFragment) -> Result<Self, CteBuildError> {
        let unnest_source = fragment.meta(META_UNNEST_SOURCE).map(str::to_string);
        let filter = fragment.meta(META_FILTER).map(str::to_string);
        let expression = fragment.expression.clone();

        match (fragment.requires_unnest, fragment.is_aggregate) {
            (false, true) => Err(CteBuildError::UnsupportedShape {
                name: fragment.name.clone(),
                reason: "aggregate without unnested rows".to_string(),
            }),
            (false, false) if filter.is_some() => Err(CteBuildError::UnsupportedShape {
                name: fragment.name.clone(),
                reason: "filter without unnested rows".to_string(),
            }),
            (false, false) => Ok(CteBody::Scalar { expression }),
            (true, aggregate) => {
                let unnest_source = unnest_source
                    .ok_or_else(|| CteBuildError::MissingUnnestSource(fragment.name.clone()))?;
                Ok(if aggregate {
                    CteBody::Aggregate {
                        expression,
                        unnest_source,
                        filter,
                    }
                } else {
                    CteBody::Rows {
                        expression,
                        unnest_source,
                        filter,
                    }
                })
            }
        }
    }
}

/// One named subquery of the `WITH` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Cte {
    pub name: String,
    pub source: RelationRef,
    pub joins: Vec<RelationRef>,
    pub body: CteBody,
}

impl ToSql for Cte {
    fn to_sql(&self) -> String {
        let id = aliased(&self.source.id(), ID_COLUMN);
        let (value, lateral, filter) = match &self.body {
            CteBody::Scalar { expression } => (aliased(expression, VALUE_COLUMN), None, None),
            CteBody::Aggregate {
                expression,
                unnest_source,
                filter,
            } => {
                let where_clause = filter
                    .as_ref()
                    .map(|f| format!(" WHERE {}", f))
                    .unwrap_or_default();
                let subquery = format!(
                    "(SELECT {} FROM {}{})",
                    expression, unnest_source, where_clause
                );
                (aliased(&subquery, VALUE_COLUMN), None, None)
            }
            CteBody::Rows {
                expression,
                unnest_source,
                filter,
            } => (
                aliased(expression, VALUE_COLUMN),
                Some(unnest_source),
                filter.as_ref(),
            ),
        };

        let mut sql = format!("SELECT {}, {}\n    FROM {}", id, value, self.source.name);
        for join in &self.joins {
            sql.push_str(&format!(
                "\n    LEFT JOIN {} ON {} = {}",
                join.name,
                join.id(),
                self.source.id()
            ));
        }
        if let Some(unnest_source) = lateral {
            sql.push_str(&format!("\n    CROSS JOIN LATERAL {}", unnest_source));
        }
        if let Some(filter) = filter {
            sql.push_str(&format!("\n    WHERE {}", filter));
        }
        sql
    }
}

/// The whole statement: every CTE in order, then the terminal projection.
#[derive(Debug, Clone, PartialEq)]
pub struct CteQuery {
    pub ctes: Vec<Cte>,
    pub terminal: String,
}

impl ToSql for CteQuery {
    fn to_sql(&self) -> String {
        let mut sql = String::new();
        for (i, cte) in self.ctes.iter().enumerate() {
            sql.push_str(if i == 0 { "WITH " } else { ",\n" });
            sql.push_str(&cte.name);
            sql.push_str(" AS (\n    ");
            sql.push_str(&cte.to_sql());
            sql.push_str("\n)");
        }
        if !self.ctes.is_empty() {
            sql.push('\n');
        }
        sql.push_str(&format!(
            "SELECT {}.{}, {}.{}\nFROM {}",
            self.terminal, ID_COLUMN, self.terminal, VALUE_COLUMN, self.terminal
        ));
        sql
    }
}

/// `expr AS alias`, or just `expr` when it is a column already named `alias`.
fn aliased(expr: &str, alias: &str) -> String {
    if projects_column(expr, alias) {
        expr.to_string()
    } else {
        format!("{} AS {}", expr, alias)
    }
}

/// Whether `expr` is a `relation.column` reference to `column`.
fn projects_column(expr: &str, column: &str) -> bool {
    match expr.rsplit_once('.') {
        Some((relation, col)) => {
            col == column
                && !relation.is_empty()
                && relation
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    }
}
