//! Dependency graph over the fragments of one translation.
//!
//! Nodes are fragments in emission order. An edge runs from every relation a
//! fragment reads (its source table and its dependencies) to the fragment.
//! Relations that are not fragments are external tables; they have no node
//! and are reported through [`CteGraph::external_tables`].

use std::collections::{BTreeSet, HashMap};

use crate::translator::SqlFragment;

use super::errors::CteBuildError;

pub struct CteGraph<'a> {
    nodes: Vec<&'a SqlFragment>,
    index: HashMap<&'a str, usize>,
    /// Fragment dependencies per node, each listed once
    dependencies: Vec<Vec<usize>>,
    /// Fragments reading each node
    dependents: Vec<Vec<usize>>,
    external: Vec<String>,
}

impl<'a> CteGraph<'a> {
    pub fn build(fragments: &'a [SqlFragment]) -> Result<Self, CteBuildError> {
        if fragments.is_empty() {
            return Err(CteBuildError::EmptyFragments);
        }

        let mut index = HashMap::with_capacity(fragments.len());
        for (i, fragment) in fragments.iter().enumerate() {
            if index.insert(fragment.name.as_str(), i).is_some() {
                return Err(CteBuildError::DuplicateName(fragment.name.clone()));
            }
        }

        let mut dependencies = vec![Vec::new(); fragments.len()];
        let mut dependents = vec![Vec::new(); fragments.len()];
        let mut external: Vec<String> = Vec::new();

        for (i, fragment) in fragments.iter().enumerate() {
            for relation in relations_read(fragment) {
                match index.get(relation) {
                    Some(&dep) => {
                        if !dependencies[i].contains(&dep) {
                            dependencies[i].push(dep);
                            dependents[dep].push(i);
                        }
                    }
                    None => {
                        if !external.iter().any(|t| t == relation) {
                            external.push(relation.to_string());
                        }
                    }
                }
            }
        }

        Ok(Self {
            nodes: fragments.iter().collect(),
            index,
            dependencies,
            dependents,
            external,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn fragment(&self, node: usize) -> &'a SqlFragment {
        self.nodes[node]
    }

    /// Whether `name` is a fragment of this graph rather than an external table.
    pub fn is_fragment(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Tables read but not defined by any fragment, in first-reference order.
    pub fn external_tables(&self) -> &[String] {
        &self.external
    }

    pub fn dependents(&self, node: usize) -> &[usize] {
        &self.dependents[node]
    }

    /// Fragments in dependency order.
    ///
    /// Kahn's algorithm; among the fragments ready at each step the one
    /// emitted first is taken, so an already ordered list comes back
    /// unchanged.
    pub fn topological_order(&self) -> Result<Vec<usize>, CteBuildError> {
        let mut in_degree: Vec<usize> = self.dependencies.iter().map(Vec::len).collect();
        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| i)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(node) = ready.pop_first() {
            order.push(node);
            for &dependent in &self.dependents[node] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() < self.nodes.len() {
            let stuck = in_degree
                .iter()
                .enumerate()
                .filter(|(_, d)| **d > 0)
                .map(|(i, _)| self.nodes[i].name.clone())
                .collect();
            return Err(CteBuildError::Cycle(stuck));
        }
        Ok(order)
    }

    /// The single fragment nothing else reads.
    pub fn terminal(&self) -> Result<usize, CteBuildError> {
        let terminals: Vec<usize> = (0..self.nodes.len())
            .filter(|&i| self.dependents[i].is_empty())
            .collect();
        match terminals.as_slice() {
            [single] => Ok(*single),
            // every node has a dependent: there is a cycle
            [] => Err(CteBuildError::Cycle(
                self.nodes.iter().map(|f| f.name.clone()).collect(),
            )),
            _ => Err(CteBuildError::MultipleTerminals(
                terminals
                    .iter()
                    .map(|&i| self.nodes[i].name.clone())
                    .collect(),
            )),
        }
    }
}

/// Source table first, then the declared dependencies in order.
fn relations_read(fragment: &SqlFragment) -> impl Iterator<Item = &str> {
    std::iter::once(fragment.source_table.as_str())
        .chain(fragment.dependencies.iter().map(String::as_str))
}
