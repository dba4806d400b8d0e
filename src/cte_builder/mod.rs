//! Assembly of translator fragments into one `WITH ... SELECT` statement.
//!
//! The builder trusts the translator's semantics and only checks the
//! fragment contract: unique names, an acyclic graph and a single terminal.
//! Every fragment becomes a CTE with the columns `id` and `value`; the final
//! projection reads the terminal one.

pub mod errors;
pub mod graph;
pub mod to_sql;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::TranslatorConfig;
use crate::translator::{SqlFragment, META_FILTER, META_JOIN, META_UNNEST_SOURCE};

pub use errors::CteBuildError;
pub use graph::CteGraph;
pub use to_sql::{Cte, CteBody, CteQuery, RelationRef, ToSql, ID_COLUMN, VALUE_COLUMN};

/// A compiled statement and the tables it expects to exist.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub sql: String,
    /// External tables the statement reads, in first-reference order
    pub source_tables: Vec<String>,
    /// Translation warnings (unknown types and the like)
    pub warnings: Vec<String>,
}

pub struct CteBuilder {
    /// Row id column of external tables
    id_column: String,
    inline_scalar_fragments: bool,
}

impl CteBuilder {
    pub fn new(config: &TranslatorConfig) -> Self {
        Self {
            id_column: config.id_column.clone(),
            inline_scalar_fragments: config.inline_scalar_fragments,
        }
    }

    pub fn with_inlining(mut self, enabled: bool) -> Self {
        self.inline_scalar_fragments = enabled;
        self
    }

    pub fn assemble(&self, fragments: &[SqlFragment]) -> Result<CompiledQuery, CteBuildError> {
        let graph = CteGraph::build(fragments)?;
        let order = graph.topological_order()?;
        let terminal = graph.terminal()?;
        let source_tables = graph.external_tables().to_vec();
        log::debug!(
            "Assembling {} fragment(s) over {}",
            graph.len(),
            source_tables.join(", ")
        );

        let mut ordered: Vec<SqlFragment> =
            order.iter().map(|&i| graph.fragment(i).clone()).collect();
        if self.inline_scalar_fragments {
            ordered = inline_scalar_fragments(ordered, &graph.fragment(terminal).name);
        }

        let ctes = ordered
            .iter()
            .map(|fragment| self.cte_for(fragment, &graph))
            .collect::<Result<Vec<_>, _>>()?;
        let query = CteQuery {
            ctes,
            terminal: graph.fragment(terminal).name.clone(),
        };

        Ok(CompiledQuery {
            sql: query.to_sql(),
            source_tables,
            warnings: Vec::new(),
        })
    }

    fn cte_for(&self, fragment: &SqlFragment, graph: &CteGraph<'_>) -> Result<Cte, CteBuildError> {
        let relation = |name: &str| RelationRef {
            name: name.to_string(),
            id_column: if graph.is_fragment(name) {
                ID_COLUMN.to_string()
            } else {
                self.id_column.clone()
            },
        };
        Ok(Cte {
            name: fragment.name.clone(),
            source: relation(&fragment.source_table),
            joins: fragment.joins().into_iter().map(relation).collect(),
            body: CteBody::from_fragment(fragment)?,
        })
    }
}

/// Fold every pure scalar fragment read by exactly one other fragment into
/// that reader. `fragments` must be in dependency order.
fn inline_scalar_fragments(fragments: Vec<SqlFragment>, terminal: &str) -> Vec<SqlFragment> {
    let mut fragments: Vec<Option<SqlFragment>> = fragments.into_iter().map(Some).collect();

    for i in 0..fragments.len() {
        let Some(candidate) = fragments[i].as_ref() else {
            continue;
        };
        if candidate.name == terminal || !candidate.is_pure_scalar() {
            continue;
        }

        let readers: Vec<usize> = fragments
            .iter()
            .enumerate()
            .skip(i + 1)
            .filter_map(|(j, f)| f.as_ref().filter(|f| reads(f, &candidate.name)).map(|_| j))
            .collect();
        let [reader] = readers.as_slice() else {
            continue;
        };

        let reader = *reader;
        let Some(inlined) = fragments[i].take() else {
            continue;
        };
        log::trace!("Inlining {} into its only reader", inlined.name);
        if let Some(target) = fragments[reader].as_mut() {
            *target = substitute(target, &inlined);
        }
    }

    fragments.into_iter().flatten().collect()
}

fn reads(fragment: &SqlFragment, name: &str) -> bool {
    fragment.source_table == name || fragment.dependencies.iter().any(|d| d == name)
}

/// `reader` with every `inlined.value` replaced by the inlined expression and
/// its relations taken over.
fn substitute(reader: &SqlFragment, inlined: &SqlFragment) -> SqlFragment {
    let replacement = format!("({})", inlined.expression);
    let replace = |text: &str| replace_value_reference(text, &inlined.name, &replacement);

    let source_table = if reader.source_table == inlined.name {
        inlined.source_table.clone()
    } else {
        reader.source_table.clone()
    };

    let mut dependencies: Vec<String> = Vec::new();
    for dep in &reader.dependencies {
        let expanded: Vec<String> = if *dep == inlined.name {
            inlined.dependencies.clone()
        } else {
            vec![dep.clone()]
        };
        for relation in expanded {
            if !dependencies.contains(&relation) {
                dependencies.push(relation);
            }
        }
    }

    let mut metadata: BTreeMap<String, String> = reader.metadata.clone();
    for key in [META_UNNEST_SOURCE, META_FILTER] {
        if let Some(value) = metadata.get_mut(key) {
            *value = replace(value);
        }
    }
    let joins: Vec<&str> = dependencies
        .iter()
        .map(String::as_str)
        .filter(|d| *d != source_table)
        .collect();
    if joins.is_empty() {
        metadata.remove(META_JOIN);
    } else {
        metadata.insert(META_JOIN.to_string(), joins.join(","));
    }

    SqlFragment {
        name: reader.name.clone(),
        expression: replace(&reader.expression),
        source_table,
        requires_unnest: reader.requires_unnest,
        is_aggregate: reader.is_aggregate,
        dependencies,
        metadata,
    }
}

/// Replace whole-word occurrences of `relation.value` in `text`.
fn replace_value_reference(text: &str, relation: &str, replacement: &str) -> String {
    let needle = format!("{}.{}", relation, VALUE_COLUMN);
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find(&needle) {
        let before = rest[..pos].chars().next_back();
        let after = rest[pos + needle.len()..].chars().next();
        out.push_str(&rest[..pos]);
        if before.is_some_and(is_word) || after.is_some_and(is_word) {
            out.push_str(&needle);
        } else {
            out.push_str(replacement);
        }
        rest = &rest[pos + needle.len()..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translator::META_VALUE_KIND;

    fn builder() -> CteBuilder {
        CteBuilder::new(&TranslatorConfig::default())
    }

    fn chain() -> Vec<SqlFragment> {
        vec![
            SqlFragment::new("c1", "json_extract(patient.resource, '$.gender')", "patient"),
            SqlFragment::new("c2", "upper(c1.value)", "c1"),
            SqlFragment::new("c3", "c2.value", "c2")
                .with_metadata(META_VALUE_KIND, "native:String"),
        ]
    }

    #[test]
    fn test_assemble_chain() {
        let query = builder().assemble(&chain()).unwrap();
        assert_eq!(
            query.sql,
            "WITH c1 AS (\n    SELECT patient.id, json_extract(patient.resource, '$.gender') AS value\n    FROM patient\n),\n\
             c2 AS (\n    SELECT c1.id, upper(c1.value) AS value\n    FROM c1\n),\n\
             c3 AS (\n    SELECT c2.id, c2.value\n    FROM c2\n)\n\
             SELECT c3.id, c3.value\nFROM c3"
        );
        assert_eq!(query.source_tables, vec!["patient".to_string()]);
    }

    #[test]
    fn test_definitions_precede_references() {
        let mut fragments = chain();
        fragments.reverse();
        let sql = builder().assemble(&fragments).unwrap().sql;
        let c1 = sql.find("c1 AS (").unwrap();
        let c2 = sql.find("c2 AS (").unwrap();
        let c3 = sql.find("c3 AS (").unwrap();
        assert!(c1 < c2 && c2 < c3);
    }

    #[test]
    fn test_inlining_folds_single_use_scalars() {
        let query = builder().with_inlining(true).assemble(&chain()).unwrap();
        assert_eq!(
            query.sql,
            "WITH c3 AS (\n    SELECT patient.id, (upper((json_extract(patient.resource, '$.gender')))) AS value\n    FROM patient\n)\n\
             SELECT c3.id, c3.value\nFROM c3"
        );
    }

    #[test]
    fn test_shared_fragment_is_not_inlined() {
        let fragments = vec![
            SqlFragment::new("c1", "json_extract(patient.resource, '$.gender')", "patient"),
            SqlFragment::new("c2", "upper(c1.value)", "c1"),
            SqlFragment::new("c3", "(c1.value = c2.value)", "c1")
                .with_dependencies(vec!["c1".into(), "c2".into()])
                .with_metadata(META_JOIN, "c2"),
        ];
        let sql = builder().with_inlining(true).assemble(&fragments).unwrap().sql;
        assert!(sql.starts_with("WITH c1 AS ("));
        // c2 is read once and folded into c3, which then reads c1 only
        assert!(!sql.contains("c2 AS ("));
        assert!(sql.contains("SELECT c1.id, (c1.value = (upper(c1.value))) AS value\n    FROM c1\n)"));
    }

    #[test]
    fn test_external_id_column() {
        let config = TranslatorConfig {
            id_column: "resource_id".to_string(),
            ..Default::default()
        };
        let query = CteBuilder::new(&config).assemble(&chain()).unwrap();
        assert!(query.sql.contains("SELECT patient.resource_id AS id, json_extract("));
        assert!(query.sql.contains("SELECT c1.id, upper(c1.value) AS value"));
    }

    #[test]
    fn test_invalid_graphs_are_rejected() {
        let cyclic = vec![
            SqlFragment::new("c1", "c2.value", "c2"),
            SqlFragment::new("c2", "c1.value", "c1"),
        ];
        assert!(matches!(
            builder().assemble(&cyclic),
            Err(CteBuildError::Cycle(_))
        ));
        assert_eq!(builder().assemble(&[]), Err(CteBuildError::EmptyFragments));
    }

    #[test]
    fn test_replace_value_reference_respects_word_boundaries() {
        assert_eq!(
            replace_value_reference("c1.value + c11.value + xc1.value + c1.values", "c1", "(1)"),
            "(1) + c11.value + xc1.value + c1.values"
        );
    }
}
