//! FHIR element model: the properties of resources and datatypes.
//!
//! Only what path resolution needs is recorded: element name, allowed types and
//! whether the element repeats. Choice elements (`value[x]`) are stored under
//! their base name with more than one allowed type.

/// Maximum cardinality of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Single,
    Many,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementDefinition {
    /// Element name, without the `[x]` suffix for choice elements
    pub name: &'static str,
    /// Allowed types (FHIR type names, backbone elements as `Resource.element`)
    pub types: &'static [&'static str],
    pub max: Cardinality,
}

impl ElementDefinition {
    pub fn is_choice(&self) -> bool {
        self.types.len() > 1
    }

    pub fn is_collection(&self) -> bool {
        self.max == Cardinality::Many
    }

    /// JSON keys of a choice element paired with their types
    /// (`value[x]` → `valueQuantity`/`Quantity`, `valueString`/`string`, ...).
    pub fn choice_keys(&self) -> Vec<(String, &'static str)> {
        self.types
            .iter()
            .map(|t| (choice_key(self.name, t), *t))
            .collect()
    }
}

/// An element found on a type (or one of its supertypes).
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedElement<'a> {
    pub definition: &'a ElementDefinition,
    /// Type that declares the element
    pub declared_on: &'static str,
    /// Key to read from the JSON document
    pub json_key: String,
    /// Known concrete type. `None` for a choice element navigated by its base name.
    pub concrete_type: Option<&'static str>,
}

impl ResolvedElement<'_> {
    pub fn is_polymorphic(&self) -> bool {
        self.concrete_type.is_none()
    }

    pub fn is_collection(&self) -> bool {
        self.definition.is_collection()
    }
}

/// `value` + `dateTime` → `valueDateTime`
pub fn choice_key(base: &str, type_name: &str) -> String {
    let mut chars = type_name.chars();
    match chars.next() {
        Some(first) => format!("{}{}{}", base, first.to_ascii_uppercase(), chars.as_str()),
        None => base.to_string(),
    }
}

const fn one(name: &'static str, types: &'static [&'static str]) -> ElementDefinition {
    ElementDefinition {
        name,
        types,
        max: Cardinality::Single,
    }
}

const fn many(name: &'static str, types: &'static [&'static str]) -> ElementDefinition {
    ElementDefinition {
        name,
        types,
        max: Cardinality::Many,
    }
}

const OBSERVATION_VALUE: &[&str] = &[
    "Quantity",
    "CodeableConcept",
    "string",
    "boolean",
    "integer",
    "Range",
    "Ratio",
    "time",
    "dateTime",
    "Period",
];

const ONSET: &[&str] = &["dateTime", "Age", "Period", "Range", "string"];

const EXTENSION_VALUE: &[&str] = &[
    "base64Binary",
    "boolean",
    "canonical",
    "code",
    "date",
    "dateTime",
    "decimal",
    "id",
    "instant",
    "integer",
    "markdown",
    "oid",
    "positiveInt",
    "string",
    "time",
    "unsignedInt",
    "uri",
    "url",
    "uuid",
    "Address",
    "Age",
    "Annotation",
    "Attachment",
    "CodeableConcept",
    "Coding",
    "ContactPoint",
    "Count",
    "Distance",
    "Duration",
    "HumanName",
    "Identifier",
    "Period",
    "Quantity",
    "Range",
    "Ratio",
    "Reference",
    "Timing",
];

pub(super) fn builtin_elements() -> Vec<(&'static str, Vec<ElementDefinition>)> {
    vec![
        // ----- base hierarchy -----
        ("Element", vec![one("id", &["string"]), many("extension", &["Extension"])]),
        ("BackboneElement", vec![many("modifierExtension", &["Extension"])]),
        (
            "Resource",
            vec![
                one("id", &["id"]),
                one("meta", &["Meta"]),
                one("implicitRules", &["uri"]),
                one("language", &["code"]),
            ],
        ),
        (
            "DomainResource",
            vec![
                one("text", &["Narrative"]),
                many("contained", &["Resource"]),
                many("extension", &["Extension"]),
                many("modifierExtension", &["Extension"]),
            ],
        ),
        // ----- datatypes -----
        (
            "HumanName",
            vec![
                one("use", &["code"]),
                one("text", &["string"]),
                one("family", &["string"]),
                many("given", &["string"]),
                many("prefix", &["string"]),
                many("suffix", &["string"]),
                one("period", &["Period"]),
            ],
        ),
        (
            "Address",
            vec![
                one("use", &["code"]),
                one("type", &["code"]),
                one("text", &["string"]),
                many("line", &["string"]),
                one("city", &["string"]),
                one("district", &["string"]),
                one("state", &["string"]),
                one("postalCode", &["string"]),
                one("country", &["string"]),
                one("period", &["Period"]),
            ],
        ),
        (
            "ContactPoint",
            vec![
                one("system", &["code"]),
                one("value", &["string"]),
                one("use", &["code"]),
                one("rank", &["positiveInt"]),
                one("period", &["Period"]),
            ],
        ),
        (
            "Identifier",
            vec![
                one("use", &["code"]),
                one("type", &["CodeableConcept"]),
                one("system", &["uri"]),
                one("value", &["string"]),
                one("period", &["Period"]),
                one("assigner", &["Reference"]),
            ],
        ),
        (
            "CodeableConcept",
            vec![many("coding", &["Coding"]), one("text", &["string"])],
        ),
        (
            "Coding",
            vec![
                one("system", &["uri"]),
                one("version", &["string"]),
                one("code", &["code"]),
                one("display", &["string"]),
                one("userSelected", &["boolean"]),
            ],
        ),
        (
            "Quantity",
            vec![
                one("value", &["decimal"]),
                one("comparator", &["code"]),
                one("unit", &["string"]),
                one("system", &["uri"]),
                one("code", &["code"]),
            ],
        ),
        ("Period", vec![one("start", &["dateTime"]), one("end", &["dateTime"])]),
        ("Range", vec![one("low", &["Quantity"]), one("high", &["Quantity"])]),
        (
            "Ratio",
            vec![one("numerator", &["Quantity"]), one("denominator", &["Quantity"])],
        ),
        (
            "Reference",
            vec![
                one("reference", &["string"]),
                one("type", &["uri"]),
                one("identifier", &["Identifier"]),
                one("display", &["string"]),
            ],
        ),
        (
            "Attachment",
            vec![
                one("contentType", &["code"]),
                one("language", &["code"]),
                one("data", &["base64Binary"]),
                one("url", &["url"]),
                one("size", &["unsignedInt"]),
                one("hash", &["base64Binary"]),
                one("title", &["string"]),
                one("creation", &["dateTime"]),
            ],
        ),
        (
            "Annotation",
            vec![
                one("author", &["Reference", "string"]),
                one("time", &["dateTime"]),
                one("text", &["markdown"]),
            ],
        ),
        (
            "Extension",
            vec![one("url", &["uri"]), one("value", EXTENSION_VALUE)],
        ),
        (
            "Meta",
            vec![
                one("versionId", &["id"]),
                one("lastUpdated", &["instant"]),
                one("source", &["uri"]),
                many("profile", &["canonical"]),
                many("security", &["Coding"]),
                many("tag", &["Coding"]),
            ],
        ),
        ("Narrative", vec![one("status", &["code"]), one("div", &["xhtml"])]),
        (
            "Timing",
            vec![many("event", &["dateTime"]), one("code", &["CodeableConcept"])],
        ),
        // ----- Patient -----
        (
            "Patient",
            vec![
                many("identifier", &["Identifier"]),
                one("active", &["boolean"]),
                many("name", &["HumanName"]),
                many("telecom", &["ContactPoint"]),
                one("gender", &["code"]),
                one("birthDate", &["date"]),
                one("deceased", &["boolean", "dateTime"]),
                many("address", &["Address"]),
                one("maritalStatus", &["CodeableConcept"]),
                one("multipleBirth", &["boolean", "integer"]),
                many("photo", &["Attachment"]),
                many("contact", &["Patient.contact"]),
                many("communication", &["Patient.communication"]),
                many("generalPractitioner", &["Reference"]),
                one("managingOrganization", &["Reference"]),
                many("link", &["Patient.link"]),
            ],
        ),
        (
            "Patient.contact",
            vec![
                many("relationship", &["CodeableConcept"]),
                one("name", &["HumanName"]),
                many("telecom", &["ContactPoint"]),
                one("address", &["Address"]),
                one("gender", &["code"]),
                one("organization", &["Reference"]),
                one("period", &["Period"]),
            ],
        ),
        (
            "Patient.communication",
            vec![one("language", &["CodeableConcept"]), one("preferred", &["boolean"])],
        ),
        (
            "Patient.link",
            vec![one("other", &["Reference"]), one("type", &["code"])],
        ),
        // ----- Practitioner / Organization -----
        (
            "Practitioner",
            vec![
                many("identifier", &["Identifier"]),
                one("active", &["boolean"]),
                many("name", &["HumanName"]),
                many("telecom", &["ContactPoint"]),
                many("address", &["Address"]),
                one("gender", &["code"]),
                one("birthDate", &["date"]),
                many("photo", &["Attachment"]),
            ],
        ),
        (
            "Organization",
            vec![
                many("identifier", &["Identifier"]),
                one("active", &["boolean"]),
                many("type", &["CodeableConcept"]),
                one("name", &["string"]),
                many("alias", &["string"]),
                many("telecom", &["ContactPoint"]),
                many("address", &["Address"]),
                one("partOf", &["Reference"]),
            ],
        ),
        // ----- Observation -----
        (
            "Observation",
            vec![
                many("identifier", &["Identifier"]),
                many("basedOn", &["Reference"]),
                many("partOf", &["Reference"]),
                one("status", &["code"]),
                many("category", &["CodeableConcept"]),
                one("code", &["CodeableConcept"]),
                one("subject", &["Reference"]),
                many("focus", &["Reference"]),
                one("encounter", &["Reference"]),
                one("effective", &["dateTime", "Period", "Timing", "instant"]),
                one("issued", &["instant"]),
                many("performer", &["Reference"]),
                one("value", OBSERVATION_VALUE),
                one("dataAbsentReason", &["CodeableConcept"]),
                many("interpretation", &["CodeableConcept"]),
                many("note", &["Annotation"]),
                one("bodySite", &["CodeableConcept"]),
                one("method", &["CodeableConcept"]),
                one("specimen", &["Reference"]),
                one("device", &["Reference"]),
                many("referenceRange", &["Observation.referenceRange"]),
                many("hasMember", &["Reference"]),
                many("derivedFrom", &["Reference"]),
                many("component", &["Observation.component"]),
            ],
        ),
        (
            "Observation.referenceRange",
            vec![
                one("low", &["SimpleQuantity"]),
                one("high", &["SimpleQuantity"]),
                one("type", &["CodeableConcept"]),
                many("appliesTo", &["CodeableConcept"]),
                one("age", &["Range"]),
                one("text", &["string"]),
            ],
        ),
        (
            "Observation.component",
            vec![
                one("code", &["CodeableConcept"]),
                one("value", OBSERVATION_VALUE),
                one("dataAbsentReason", &["CodeableConcept"]),
                many("interpretation", &["CodeableConcept"]),
                many("referenceRange", &["Observation.referenceRange"]),
            ],
        ),
        // ----- Condition -----
        (
            "Condition",
            vec![
                many("identifier", &["Identifier"]),
                one("clinicalStatus", &["CodeableConcept"]),
                one("verificationStatus", &["CodeableConcept"]),
                many("category", &["CodeableConcept"]),
                one("severity", &["CodeableConcept"]),
                one("code", &["CodeableConcept"]),
                many("bodySite", &["CodeableConcept"]),
                one("subject", &["Reference"]),
                one("encounter", &["Reference"]),
                one("onset", ONSET),
                one("abatement", ONSET),
                one("recordedDate", &["dateTime"]),
                one("recorder", &["Reference"]),
                one("asserter", &["Reference"]),
                many("note", &["Annotation"]),
            ],
        ),
        // ----- Encounter -----
        (
            "Encounter",
            vec![
                many("identifier", &["Identifier"]),
                one("status", &["code"]),
                one("class", &["Coding"]),
                many("type", &["CodeableConcept"]),
                one("serviceType", &["CodeableConcept"]),
                one("priority", &["CodeableConcept"]),
                one("subject", &["Reference"]),
                many("participant", &["Encounter.participant"]),
                one("period", &["Period"]),
                one("length", &["Duration"]),
                many("reasonCode", &["CodeableConcept"]),
                many("reasonReference", &["Reference"]),
                one("serviceProvider", &["Reference"]),
                one("partOf", &["Reference"]),
            ],
        ),
        (
            "Encounter.participant",
            vec![
                many("type", &["CodeableConcept"]),
                one("period", &["Period"]),
                one("individual", &["Reference"]),
            ],
        ),
        // ----- Procedure -----
        (
            "Procedure",
            vec![
                many("identifier", &["Identifier"]),
                one("status", &["code"]),
                one("category", &["CodeableConcept"]),
                one("code", &["CodeableConcept"]),
                one("subject", &["Reference"]),
                one("encounter", &["Reference"]),
                one("performed", &["dateTime", "Period", "string", "Age", "Range"]),
                one("recorder", &["Reference"]),
                one("asserter", &["Reference"]),
                many("reasonCode", &["CodeableConcept"]),
                many("bodySite", &["CodeableConcept"]),
                one("outcome", &["CodeableConcept"]),
                many("note", &["Annotation"]),
            ],
        ),
        // ----- MedicationRequest -----
        (
            "MedicationRequest",
            vec![
                many("identifier", &["Identifier"]),
                one("status", &["code"]),
                one("intent", &["code"]),
                many("category", &["CodeableConcept"]),
                one("priority", &["code"]),
                one("medication", &["CodeableConcept", "Reference"]),
                one("subject", &["Reference"]),
                one("encounter", &["Reference"]),
                one("authoredOn", &["dateTime"]),
                one("requester", &["Reference"]),
                many("reasonCode", &["CodeableConcept"]),
                many("note", &["Annotation"]),
                many(
                    "dosageInstruction",
                    &["MedicationRequest.dosageInstruction"],
                ),
            ],
        ),
        (
            "MedicationRequest.dosageInstruction",
            vec![
                one("sequence", &["integer"]),
                one("text", &["string"]),
                one("timing", &["Timing"]),
                one("asNeeded", &["boolean", "CodeableConcept"]),
                one("route", &["CodeableConcept"]),
            ],
        ),
        // ----- Bundle -----
        (
            "Bundle",
            vec![
                one("identifier", &["Identifier"]),
                one("type", &["code"]),
                one("timestamp", &["instant"]),
                one("total", &["unsignedInt"]),
                many("entry", &["Bundle.entry"]),
            ],
        ),
        (
            "Bundle.entry",
            vec![one("fullUrl", &["uri"]), one("resource", &["Resource"])],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choice_key_capitalizes_type() {
        assert_eq!(choice_key("value", "Quantity"), "valueQuantity");
        assert_eq!(choice_key("effective", "dateTime"), "effectiveDateTime");
        assert_eq!(choice_key("value", ""), "value");
    }

    #[test]
    fn test_choice_keys_follow_declared_order() {
        let deceased = one("deceased", &["boolean", "dateTime"]);
        assert!(deceased.is_choice());
        assert_eq!(
            deceased.choice_keys(),
            vec![
                ("deceasedBoolean".to_string(), "boolean"),
                ("deceasedDateTime".to_string(), "dateTime"),
            ]
        );
    }

    #[test]
    fn test_element_tables_have_unique_names() {
        for (type_name, elements) in builtin_elements() {
            let mut names: Vec<&str> = elements.iter().map(|e| e.name).collect();
            names.sort_unstable();
            let before = names.len();
            names.dedup();
            assert_eq!(before, names.len(), "duplicate element on {}", type_name);
        }
    }
}
