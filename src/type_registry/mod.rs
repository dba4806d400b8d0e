//! Type registry: FHIRPath System types, FHIR types and the FHIR element model.
//!
//! The registry is a read-only static ([`TYPE_REGISTRY`]) built on first use.
//! It answers three questions for the translator and the dialects:
//!
//! - what does a type name refer to (aliases, namespaces, case-insensitive fallback)
//! - does type A conform to type B (direct supertype edges plus System equivalents)
//! - how is a primitive type checked at runtime in a given dialect
//!
//! The hierarchy is a tree: every type has at most one direct supertype.

pub mod model;
mod system_types;

use std::collections::HashMap;
use std::fmt;

use crate::fhirpath_ast::TypeSpecifier;

pub use model::{choice_key, Cardinality, ElementDefinition, ResolvedElement};

const FHIRPATH_SYSTEM_URL: &str = "http://hl7.org/fhirpath/System.";
const FHIR_STRUCTURE_DEFINITION_URL: &str = "http://hl7.org/fhir/StructureDefinition/";

lazy_static::lazy_static! {
    /// Process-wide registry of built-in types and elements.
    pub static ref TYPE_REGISTRY: TypeRegistry = TypeRegistry::builtin();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeNamespace {
    System,
    Fhir,
}

impl TypeNamespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeNamespace::System => "System",
            TypeNamespace::Fhir => "FHIR",
        }
    }

    fn parse(text: &str) -> Option<Self> {
        if text.eq_ignore_ascii_case("system") {
            Some(TypeNamespace::System)
        } else if text.eq_ignore_ascii_case("fhir") {
            Some(TypeNamespace::Fhir)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Primitive,
    Complex,
    Resource,
}

/// How a runtime type check reads a JSON value in one dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeRendering {
    /// Tags returned by the dialect's JSON type function that may match
    pub json_types: &'static [&'static str],
    /// Additional regex the value's text form must match
    pub text_pattern: Option<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialectRenderings {
    pub duckdb: Option<TypeRendering>,
    pub postgresql: Option<TypeRendering>,
}

impl DialectRenderings {
    /// Complex types are never checked at runtime.
    pub const fn none() -> Self {
        Self {
            duckdb: None,
            postgresql: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeEntry {
    /// Canonical name within its namespace
    pub name: &'static str,
    pub namespace: TypeNamespace,
    pub category: TypeCategory,
    pub supertype: Option<(TypeNamespace, &'static str)>,
    /// System type a FHIR primitive maps to (`code` → `String`)
    pub system_equivalent: Option<&'static str>,
    pub renderings: DialectRenderings,
}

impl TypeEntry {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace.as_str(), self.name)
    }

    pub fn is_primitive(&self) -> bool {
        self.category == TypeCategory::Primitive
    }

    pub fn is_resource(&self) -> bool {
        self.category == TypeCategory::Resource
    }

    /// Every spelling that resolves to this entry case-sensitively.
    pub fn aliases(&self) -> Vec<String> {
        let mut aliases = vec![self.name.to_string(), self.qualified_name()];
        match self.namespace {
            TypeNamespace::System => {
                aliases.push(format!("{}{}", FHIRPATH_SYSTEM_URL, self.name))
            }
            TypeNamespace::Fhir => {
                aliases.push(format!("{}{}", FHIR_STRUCTURE_DEFINITION_URL, self.name))
            }
        }
        aliases
    }

    fn same_as(&self, other: &TypeEntry) -> bool {
        self.namespace == other.namespace && self.name == other.name
    }
}

impl fmt::Display for TypeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qualified_name())
    }
}

pub struct TypeRegistry {
    entries: Vec<TypeEntry>,
    by_key: HashMap<TypeNamespace, HashMap<&'static str, usize>>,
    by_lowercase: HashMap<String, Vec<usize>>,
    elements: HashMap<&'static str, Vec<ElementDefinition>>,
}

impl TypeRegistry {
    pub fn builtin() -> Self {
        let entries = system_types::builtin_types();
        let mut by_key: HashMap<TypeNamespace, HashMap<&'static str, usize>> = HashMap::new();
        let mut by_lowercase: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, entry) in entries.iter().enumerate() {
            by_key
                .entry(entry.namespace)
                .or_default()
                .insert(entry.name, idx);
            by_lowercase
                .entry(entry.name.to_lowercase())
                .or_default()
                .push(idx);
        }

        let elements = model::builtin_elements().into_iter().collect();

        log::debug!(
            "Type registry initialized with {} types",
            entries.len()
        );

        Self {
            entries,
            by_key,
            by_lowercase,
            elements,
        }
    }

    pub fn get(&self, namespace: TypeNamespace, name: &str) -> Option<&TypeEntry> {
        self.by_key
            .get(&namespace)
            .and_then(|names| names.get(name))
            .map(|&idx| &self.entries[idx])
    }

    /// Resolve a type name as written in an expression.
    ///
    /// Accepts `String`, `System.String`, `FHIR.string`, the canonical URL forms and
    /// backbone names such as `Patient.contact`. Unqualified names are looked up in
    /// the FHIR namespace first, then System. When nothing matches exactly the
    /// lookup is retried case-insensitively, preferring System types.
    pub fn resolve(&self, name: &str) -> Option<&TypeEntry> {
        if let Some(rest) = name.strip_prefix(FHIRPATH_SYSTEM_URL) {
            return self.get(TypeNamespace::System, rest);
        }
        if let Some(rest) = name.strip_prefix(FHIR_STRUCTURE_DEFINITION_URL) {
            return self.get(TypeNamespace::Fhir, rest);
        }

        if let Some((prefix, rest)) = name.split_once('.') {
            if let Some(namespace) = TypeNamespace::parse(prefix) {
                return self
                    .get(namespace, rest)
                    .or_else(|| self.resolve_case_insensitive(rest, Some(namespace)));
            }
        }

        self.get(TypeNamespace::Fhir, name)
            .or_else(|| self.get(TypeNamespace::System, name))
            .or_else(|| self.resolve_case_insensitive(name, None))
    }

    pub fn resolve_specifier(&self, specifier: &TypeSpecifier) -> Option<&TypeEntry> {
        match &specifier.namespace {
            Some(_) => self.resolve(&specifier.to_string()),
            None => self.resolve(&specifier.name),
        }
    }

    fn resolve_case_insensitive(
        &self,
        name: &str,
        namespace: Option<TypeNamespace>,
    ) -> Option<&TypeEntry> {
        let candidates = self.by_lowercase.get(&name.to_lowercase())?;
        let mut matches = candidates
            .iter()
            .map(|&idx| &self.entries[idx])
            .filter(|e| namespace.map_or(true, |ns| e.namespace == ns));

        let first = matches.next()?;
        if first.namespace == TypeNamespace::System {
            return Some(first);
        }
        Some(
            matches
                .find(|e| e.namespace == TypeNamespace::System)
                .unwrap_or(first),
        )
    }

    pub fn supertype_of(&self, entry: &TypeEntry) -> Option<&TypeEntry> {
        entry.supertype.and_then(|(ns, name)| self.get(ns, name))
    }

    /// The entry followed by its supertypes, nearest first.
    pub fn ancestors<'a>(&'a self, entry: &'a TypeEntry) -> Vec<&'a TypeEntry> {
        let mut chain = vec![entry];
        let mut current = self.supertype_of(entry);
        while let Some(parent) = current {
            chain.push(parent);
            current = self.supertype_of(parent);
        }
        chain
    }

    /// `true` when `child` is `parent` or reaches it through direct supertype edges.
    /// Unknown names never match.
    pub fn is_subtype_of(&self, child: &str, parent: &str) -> bool {
        match (self.resolve(child), self.resolve(parent)) {
            (Some(child), Some(parent)) => self
                .ancestors(child)
                .iter()
                .any(|ancestor| ancestor.same_as(parent)),
            _ => false,
        }
    }

    /// Whether a value of static type `actual` satisfies `is target`.
    ///
    /// Beyond the supertype walk, FHIR primitives conform to their System
    /// equivalent (`code` is a `System.String`), and everything conforms to
    /// `System.Any`.
    pub fn conforms_to(&self, actual: &TypeEntry, target: &TypeEntry) -> bool {
        if target.namespace == TypeNamespace::System && target.name == "Any" {
            return true;
        }
        self.ancestors(actual).iter().any(|ancestor| {
            ancestor.same_as(target)
                || (target.namespace == TypeNamespace::System
                    && ancestor.system_equivalent == Some(target.name))
        })
    }

    /// Names of the resource types that conform to `target`, in registration order.
    pub fn resource_types_conforming_to(&self, target: &TypeEntry) -> Vec<&'static str> {
        self.entries
            .iter()
            .filter(|entry| entry.is_resource() && self.conforms_to(entry, target))
            .map(|entry| entry.name)
            .collect()
    }

    /// Whether the type has its own element table, so unknown properties are errors.
    pub fn is_modelled(&self, type_name: &str) -> bool {
        self.resolve(type_name)
            .map_or(false, |entry| self.elements.contains_key(entry.name))
    }

    /// Look up a property on a type, walking its supertypes.
    ///
    /// A choice element matches its base name (`value`, polymorphic) and each
    /// concrete key (`valueQuantity`, resolved to `Quantity`).
    pub fn element(&self, type_name: &str, element_name: &str) -> Option<ResolvedElement<'_>> {
        let entry = self.resolve(type_name)?;
        if entry.namespace != TypeNamespace::Fhir || entry.is_primitive() {
            return None;
        }

        for ancestor in self.ancestors(entry) {
            let Some(elements) = self.elements.get(ancestor.name) else {
                continue;
            };
            for definition in elements {
                if definition.name == element_name {
                    return Some(ResolvedElement {
                        definition,
                        declared_on: ancestor.name,
                        json_key: element_name.to_string(),
                        concrete_type: if definition.is_choice() {
                            None
                        } else {
                            definition.types.first().copied()
                        },
                    });
                }
                if definition.is_choice() && element_name.starts_with(definition.name) {
                    let concrete = definition
                        .types
                        .iter()
                        .find(|t| choice_key(definition.name, t) == element_name);
                    if let Some(concrete) = concrete {
                        return Some(ResolvedElement {
                            definition,
                            declared_on: ancestor.name,
                            json_key: element_name.to_string(),
                            concrete_type: Some(*concrete),
                        });
                    }
                }
            }
        }
        None
    }

    pub fn elements_of(&self, type_name: &str) -> Option<&[ElementDefinition]> {
        self.elements.get(type_name).map(|v| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
