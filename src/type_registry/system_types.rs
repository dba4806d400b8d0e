//! Built-in type hierarchy: FHIRPath System types, FHIR primitives, FHIR
//! datatypes and the resource types known to the element model.

use super::{DialectRenderings, TypeCategory, TypeEntry, TypeNamespace, TypeRendering};

// JSON type tags reported by DuckDB's json_type()
const DUCK_BOOLEAN: &[&str] = &["BOOLEAN"];
const DUCK_STRING: &[&str] = &["VARCHAR"];
const DUCK_INTEGER: &[&str] = &["BIGINT", "UBIGINT"];
const DUCK_NUMBER: &[&str] = &["DOUBLE", "BIGINT", "UBIGINT"];

// JSON type tags reported by PostgreSQL's jsonb_typeof()
const PG_BOOLEAN: &[&str] = &["boolean"];
const PG_STRING: &[&str] = &["string"];
const PG_NUMBER: &[&str] = &["number"];

const INTEGER_TEXT: &str = r"^-?[0-9]+$";
const DATE_TEXT: &str = r"^[0-9]{4}(-[0-9]{2}(-[0-9]{2})?)?$";
const DATETIME_TEXT: &str =
    r"^[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}(:[0-9]{2}(\.[0-9]+)?)?(Z|[+-][0-9]{2}:[0-9]{2})?$";
const TIME_TEXT: &str = r"^[0-9]{2}:[0-9]{2}(:[0-9]{2}(\.[0-9]+)?)?$";
const CODE_TEXT: &str = r"^[^\s]+( [^\s]+)*$";
const ID_TEXT: &str = r"^[A-Za-z0-9\-\.]{1,64}$";
const POSITIVE_INT_TEXT: &str = r"^[1-9][0-9]*$";
const UNSIGNED_INT_TEXT: &str = r"^[0-9]+$";

fn renderings(
    duck_tags: &'static [&'static str],
    duck_pattern: Option<&'static str>,
    pg_tags: &'static [&'static str],
    pg_pattern: Option<&'static str>,
) -> DialectRenderings {
    DialectRenderings {
        duckdb: Some(TypeRendering {
            json_types: duck_tags,
            text_pattern: duck_pattern,
        }),
        postgresql: Some(TypeRendering {
            json_types: pg_tags,
            text_pattern: pg_pattern,
        }),
    }
}

fn boolean_rendering() -> DialectRenderings {
    renderings(DUCK_BOOLEAN, None, PG_BOOLEAN, None)
}

fn string_rendering(pattern: Option<&'static str>) -> DialectRenderings {
    renderings(DUCK_STRING, pattern, PG_STRING, pattern)
}

/// DuckDB distinguishes integral JSON numbers by tag; PostgreSQL only by text form.
fn integer_rendering(pattern: Option<&'static str>) -> DialectRenderings {
    renderings(
        DUCK_INTEGER,
        pattern,
        PG_NUMBER,
        Some(pattern.unwrap_or(INTEGER_TEXT)),
    )
}

fn decimal_rendering() -> DialectRenderings {
    renderings(DUCK_NUMBER, None, PG_NUMBER, None)
}

fn system(name: &'static str, supertype: Option<&'static str>, renderings: DialectRenderings) -> TypeEntry {
    TypeEntry {
        name,
        namespace: TypeNamespace::System,
        category: if supertype.is_none() || name == "Quantity" {
            TypeCategory::Complex
        } else {
            TypeCategory::Primitive
        },
        supertype: supertype.map(|s| (TypeNamespace::System, s)),
        system_equivalent: None,
        renderings,
    }
}

fn fhir_primitive(
    name: &'static str,
    supertype: &'static str,
    system_equivalent: &'static str,
    renderings: DialectRenderings,
) -> TypeEntry {
    TypeEntry {
        name,
        namespace: TypeNamespace::Fhir,
        category: TypeCategory::Primitive,
        supertype: Some((TypeNamespace::Fhir, supertype)),
        system_equivalent: Some(system_equivalent),
        renderings,
    }
}

fn fhir(name: &'static str, category: TypeCategory, supertype: Option<&'static str>) -> TypeEntry {
    TypeEntry {
        name,
        namespace: TypeNamespace::Fhir,
        category,
        supertype: supertype.map(|s| (TypeNamespace::Fhir, s)),
        system_equivalent: None,
        renderings: DialectRenderings::none(),
    }
}

pub(super) fn builtin_types() -> Vec<TypeEntry> {
    let mut types = vec![
        // ----- FHIRPath System namespace -----
        system("Any", None, DialectRenderings::none()),
        system("Boolean", Some("Any"), boolean_rendering()),
        system("String", Some("Any"), string_rendering(None)),
        system("Integer", Some("Any"), integer_rendering(None)),
        system("Decimal", Some("Any"), decimal_rendering()),
        system("Date", Some("Any"), string_rendering(Some(DATE_TEXT))),
        system("DateTime", Some("Any"), string_rendering(Some(DATETIME_TEXT))),
        system("Time", Some("Any"), string_rendering(Some(TIME_TEXT))),
        system("Quantity", Some("Any"), DialectRenderings::none()),
        // ----- FHIR base hierarchy -----
        fhir("Base", TypeCategory::Complex, None),
        fhir("Element", TypeCategory::Complex, Some("Base")),
        fhir("DataType", TypeCategory::Complex, Some("Element")),
        fhir("PrimitiveType", TypeCategory::Complex, Some("DataType")),
        fhir("BackboneElement", TypeCategory::Complex, Some("Element")),
        // ----- FHIR primitives -----
        fhir_primitive("boolean", "PrimitiveType", "Boolean", boolean_rendering()),
        fhir_primitive("string", "PrimitiveType", "String", string_rendering(None)),
        fhir_primitive("code", "string", "String", string_rendering(Some(CODE_TEXT))),
        fhir_primitive("id", "string", "String", string_rendering(Some(ID_TEXT))),
        fhir_primitive("markdown", "string", "String", string_rendering(None)),
        fhir_primitive("uri", "PrimitiveType", "String", string_rendering(None)),
        fhir_primitive("url", "uri", "String", string_rendering(None)),
        fhir_primitive("canonical", "uri", "String", string_rendering(None)),
        fhir_primitive("oid", "uri", "String", string_rendering(Some(r"^urn:oid:[0-2](\.(0|[1-9][0-9]*))+$"))),
        fhir_primitive("uuid", "uri", "String", string_rendering(Some(r"^urn:uuid:[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$"))),
        fhir_primitive("base64Binary", "PrimitiveType", "String", string_rendering(None)),
        fhir_primitive("xhtml", "PrimitiveType", "String", string_rendering(None)),
        fhir_primitive("integer", "PrimitiveType", "Integer", integer_rendering(None)),
        fhir_primitive("positiveInt", "integer", "Integer", integer_rendering(Some(POSITIVE_INT_TEXT))),
        fhir_primitive("unsignedInt", "integer", "Integer", integer_rendering(Some(UNSIGNED_INT_TEXT))),
        fhir_primitive("integer64", "PrimitiveType", "Integer", string_rendering(Some(INTEGER_TEXT))),
        fhir_primitive("decimal", "PrimitiveType", "Decimal", decimal_rendering()),
        fhir_primitive("date", "PrimitiveType", "Date", string_rendering(Some(DATE_TEXT))),
        fhir_primitive("dateTime", "PrimitiveType", "DateTime", string_rendering(Some(DATETIME_TEXT))),
        fhir_primitive("instant", "PrimitiveType", "DateTime", string_rendering(Some(DATETIME_TEXT))),
        fhir_primitive("time", "PrimitiveType", "Time", string_rendering(Some(TIME_TEXT))),
    ];

    // ----- FHIR complex datatypes -----
    for name in [
        "Address",
        "Annotation",
        "Attachment",
        "CodeableConcept",
        "Coding",
        "ContactPoint",
        "Extension",
        "HumanName",
        "Identifier",
        "Meta",
        "Narrative",
        "Period",
        "Quantity",
        "Range",
        "Ratio",
        "Reference",
        "Timing",
    ] {
        types.push(fhir(name, TypeCategory::Complex, Some("DataType")));
    }
    for name in ["Age", "Count", "Distance", "Duration", "SimpleQuantity", "MoneyQuantity"] {
        types.push(fhir(name, TypeCategory::Complex, Some("Quantity")));
    }

    // ----- Backbone elements of the modelled resources -----
    for name in [
        "Patient.contact",
        "Patient.communication",
        "Patient.link",
        "Observation.component",
        "Observation.referenceRange",
        "Encounter.participant",
        "Bundle.entry",
        "MedicationRequest.dosageInstruction",
    ] {
        types.push(fhir(name, TypeCategory::Complex, Some("BackboneElement")));
    }

    // ----- Resources -----
    types.push(fhir("Resource", TypeCategory::Resource, Some("Base")));
    types.push(fhir("DomainResource", TypeCategory::Resource, Some("Resource")));
    for name in ["Bundle", "Binary", "Parameters"] {
        types.push(fhir(name, TypeCategory::Resource, Some("Resource")));
    }
    for name in [
        "Patient",
        "Practitioner",
        "Organization",
        "Observation",
        "Condition",
        "Encounter",
        "Procedure",
        "MedicationRequest",
    ] {
        types.push(fhir(name, TypeCategory::Resource, Some("DomainResource")));
    }

    types
}
