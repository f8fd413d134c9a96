//! Declarative description of entity types: attributes, relations and placement.

use ipa_core::{DistinguishedName, Error, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// Pure value normalization applied before storage and comparison.
pub type Normalizer = fn(&str) -> String;

/// Lowercases a value.
#[must_use]
pub fn lowercase(value: &str) -> String {
    value.to_lowercase()
}

/// Strips surrounding whitespace.
#[must_use]
pub fn trimmed(value: &str) -> String {
    value.trim().to_string()
}

/// Number of values an attribute may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    /// At most one value.
    Single,
    /// Any number of values.
    Multi,
}

/// Description of one business attribute and how it is stored.
#[derive(Clone)]
pub struct AttributeSpec {
    name: String,
    storage_key: String,
    cardinality: Cardinality,
    normalizer: Option<Normalizer>,
    required: bool,
    mutable: bool,
    creatable: bool,
    searchable: bool,
    label: String,
    doc: String,
}

impl AttributeSpec {
    /// Creates an attribute whose storage key equals its name.
    ///
    /// New attributes are optional, mutable, creatable and searchable.
    #[must_use]
    pub fn new(name: impl Into<String>, cardinality: Cardinality) -> Self {
        let name = name.into();
        Self {
            storage_key: name.to_ascii_lowercase(),
            label: name.clone(),
            name,
            cardinality,
            normalizer: None,
            required: false,
            mutable: true,
            creatable: true,
            searchable: true,
            doc: String::new(),
        }
    }

    /// Single-valued attribute.
    #[must_use]
    pub fn single(name: impl Into<String>) -> Self {
        Self::new(name, Cardinality::Single)
    }

    /// Multi-valued attribute.
    #[must_use]
    pub fn multi(name: impl Into<String>) -> Self {
        Self::new(name, Cardinality::Multi)
    }

    /// Overrides the directory attribute the value is stored under.
    #[must_use]
    pub fn storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into().to_ascii_lowercase();
        self
    }

    /// Sets the normalizer.
    #[must_use]
    pub fn normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    /// Marks the attribute as required.
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Forbids changes after creation.
    #[must_use]
    pub const fn immutable(mut self) -> Self {
        self.mutable = false;
        self
    }

    /// Excludes the attribute from create requests.
    #[must_use]
    pub const fn no_create(mut self) -> Self {
        self.creatable = false;
        self
    }

    /// Excludes the attribute from update requests.
    #[must_use]
    pub const fn no_update(mut self) -> Self {
        self.mutable = false;
        self
    }

    /// Excludes the attribute from search criteria.
    #[must_use]
    pub const fn no_search(mut self) -> Self {
        self.searchable = false;
        self
    }

    /// Sets the human-readable label.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Sets the documentation text.
    #[must_use]
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = doc.into();
        self
    }

    /// Attribute name used by callers.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory attribute holding the values.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.storage_key
    }

    /// Attribute cardinality.
    #[must_use]
    pub const fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    /// Whether the attribute must be present.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }

    /// Whether the attribute may change after creation.
    #[must_use]
    pub const fn is_mutable(&self) -> bool {
        self.mutable
    }

    /// Whether the attribute may be supplied on create.
    #[must_use]
    pub const fn is_creatable(&self) -> bool {
        self.creatable
    }

    /// Whether the attribute may be used in search criteria.
    #[must_use]
    pub const fn is_searchable(&self) -> bool {
        self.searchable
    }

    /// Human-readable label.
    #[must_use]
    pub fn label_text(&self) -> &str {
        &self.label
    }

    /// Documentation text.
    #[must_use]
    pub fn doc_text(&self) -> &str {
        &self.doc
    }

    /// Applies the normalizer, if any.
    #[must_use]
    pub fn normalize(&self, value: &str) -> String {
        match self.normalizer {
            Some(normalize) => normalize(value),
            None => value.to_string(),
        }
    }
}

impl fmt::Debug for AttributeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeSpec")
            .field("name", &self.name)
            .field("storage_key", &self.storage_key)
            .field("cardinality", &self.cardinality)
            .field("normalized", &self.normalizer.is_some())
            .field("required", &self.required)
            .field("mutable", &self.mutable)
            .field("creatable", &self.creatable)
            .field("searchable", &self.searchable)
            .finish_non_exhaustive()
    }
}

/// Named membership association between an entity and a set of target types.
///
/// A managed relation writes `attribute` on the container and `reverse_attribute` on each
/// member. An unmanaged relation is the read-only mirror of another type's managed relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationSpec {
    name: String,
    attribute: String,
    reverse_attribute: String,
    targets: Vec<String>,
    managed: bool,
}

impl RelationSpec {
    /// Relation the engine writes through (e.g. `member`).
    #[must_use]
    pub fn managed(
        name: impl Into<String>,
        attribute: impl Into<String>,
        reverse_attribute: impl Into<String>,
        targets: &[&str],
    ) -> Self {
        Self {
            name: name.into(),
            attribute: attribute.into().to_ascii_lowercase(),
            reverse_attribute: reverse_attribute.into().to_ascii_lowercase(),
            targets: targets.iter().map(|t| (*t).to_string()).collect(),
            managed: true,
        }
    }

    /// Read-only mirror maintained as the reverse side of other relations (e.g. `memberof`).
    #[must_use]
    pub fn mirrored(
        name: impl Into<String>,
        attribute: impl Into<String>,
        forward_attribute: impl Into<String>,
        targets: &[&str],
    ) -> Self {
        Self {
            managed: false,
            ..Self::managed(name, attribute, forward_attribute, targets)
        }
    }

    /// Relation name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attribute stored on the owning entry.
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Attribute stored on the other side of each edge.
    #[must_use]
    pub fn reverse_attribute(&self) -> &str {
        &self.reverse_attribute
    }

    /// Allowed target type names.
    #[must_use]
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Whether members can be added or removed through this relation.
    #[must_use]
    pub const fn is_managed(&self) -> bool {
        self.managed
    }

    /// Returns true if `member_type` is an allowed target.
    #[must_use]
    pub fn allows(&self, member_type: &str) -> bool {
        self.targets.iter().any(|t| t == member_type)
    }
}

/// Immutable configuration of one entity type.
#[derive(Debug, Clone)]
pub struct ObjectTypeConfig {
    name: String,
    object_name: String,
    object_name_plural: String,
    label: String,
    container: DistinguishedName,
    object_classes: Vec<String>,
    primary_key: usize,
    unique_id_attribute: Option<String>,
    attributes: Vec<AttributeSpec>,
    relations: Vec<RelationSpec>,
    default_attributes: Vec<String>,
}

impl ObjectTypeConfig {
    /// Starts a configuration for type `name` stored under the relative `container`.
    #[must_use]
    pub fn builder(name: impl Into<String>, container: impl Into<String>) -> ObjectTypeConfigBuilder {
        let name = name.into();
        ObjectTypeConfigBuilder {
            object_name: name.clone(),
            object_name_plural: format!("{name}s"),
            label: name.clone(),
            name,
            container: container.into(),
            object_classes: Vec::new(),
            primary_key: None,
            unique_id_attribute: None,
            attributes: Vec::new(),
            relations: Vec::new(),
            default_attributes: Vec::new(),
        }
    }

    /// Type name (e.g. `hbacsvcgroup`).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Singular display name.
    #[must_use]
    pub fn object_name(&self) -> &str {
        &self.object_name
    }

    /// Plural display name.
    #[must_use]
    pub fn object_name_plural(&self) -> &str {
        &self.object_name_plural
    }

    /// Label for the whole type.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Container relative to the directory suffix.
    #[must_use]
    pub const fn container(&self) -> &DistinguishedName {
        &self.container
    }

    /// Object classes stamped on every entry.
    #[must_use]
    pub fn object_classes(&self) -> &[String] {
        &self.object_classes
    }

    /// Primary key attribute.
    #[must_use]
    pub fn primary_key(&self) -> &AttributeSpec {
        &self.attributes[self.primary_key]
    }

    /// Attribute holding the system-generated identifier, if the type has one.
    #[must_use]
    pub fn unique_id_attribute(&self) -> Option<&str> {
        self.unique_id_attribute.as_deref()
    }

    /// All attribute specs in declaration order.
    #[must_use]
    pub fn attributes(&self) -> &[AttributeSpec] {
        &self.attributes
    }

    /// Looks up an attribute by name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeSpec> {
        self.attributes.iter().find(|spec| spec.name == name)
    }

    /// Attributes usable in search criteria.
    pub fn searchable_attributes(&self) -> impl Iterator<Item = &AttributeSpec> + '_ {
        self.attributes.iter().filter(|spec| spec.searchable)
    }

    /// Declared relations.
    #[must_use]
    pub fn relations(&self) -> &[RelationSpec] {
        &self.relations
    }

    /// Looks up a relation by name.
    #[must_use]
    pub fn relation(&self, name: &str) -> Option<&RelationSpec> {
        self.relations.iter().find(|relation| relation.name == name)
    }

    /// Looks up a relation by the attribute it stores.
    #[must_use]
    pub fn relation_by_attribute(&self, attribute: &str) -> Option<&RelationSpec> {
        self.relations
            .iter()
            .find(|relation| relation.attribute.eq_ignore_ascii_case(attribute))
    }

    /// Attributes and relations returned unless every attribute is requested.
    #[must_use]
    pub fn default_attributes(&self) -> &[String] {
        &self.default_attributes
    }

    /// Normalizes a caller-supplied primary key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValidationError`] if the key is empty after normalization.
    pub fn normalize_primary_key(&self, key: &str) -> Result<String> {
        let spec = self.primary_key();
        let normalized = spec.normalize(key);
        if normalized.trim().is_empty() {
            return Err(Error::ValidationError(format!(
                "{} `{}` must not be empty",
                self.object_name,
                spec.name()
            )));
        }
        Ok(normalized)
    }
}

/// Builder for [`ObjectTypeConfig`].
#[derive(Debug)]
pub struct ObjectTypeConfigBuilder {
    name: String,
    object_name: String,
    object_name_plural: String,
    label: String,
    container: String,
    object_classes: Vec<String>,
    primary_key: Option<String>,
    unique_id_attribute: Option<String>,
    attributes: Vec<AttributeSpec>,
    relations: Vec<RelationSpec>,
    default_attributes: Vec<String>,
}

impl ObjectTypeConfigBuilder {
    /// Sets singular and plural display names.
    #[must_use]
    pub fn object_name(mut self, singular: impl Into<String>, plural: impl Into<String>) -> Self {
        self.object_name = singular.into();
        self.object_name_plural = plural.into();
        self
    }

    /// Sets the type label.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Sets the object classes.
    #[must_use]
    pub fn object_classes(mut self, classes: &[&str]) -> Self {
        self.object_classes = classes.iter().map(|c| (*c).to_string()).collect();
        self
    }

    /// Declares the primary key; the attribute is forced required and immutable.
    #[must_use]
    pub fn primary_key(mut self, spec: AttributeSpec) -> Self {
        self.primary_key = Some(spec.name.clone());
        self.attributes.push(spec.required().immutable());
        self
    }

    /// Sets the attribute holding the system-generated identifier.
    #[must_use]
    pub fn unique_id_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.unique_id_attribute = Some(attribute.into().to_ascii_lowercase());
        self
    }

    /// Declares an attribute.
    #[must_use]
    pub fn attribute(mut self, spec: AttributeSpec) -> Self {
        self.attributes.push(spec);
        self
    }

    /// Declares a relation.
    #[must_use]
    pub fn relation(mut self, relation: RelationSpec) -> Self {
        self.relations.push(relation);
        self
    }

    /// Sets the attributes returned by default.
    #[must_use]
    pub fn default_attributes(mut self, names: &[&str]) -> Self {
        self.default_attributes = names.iter().map(|n| (*n).to_string()).collect();
        self
    }

    /// Validates and freezes the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] when the container is malformed, the primary key is
    /// missing or multi-valued, no object class is given, or storage keys collide.
    pub fn build(self) -> Result<ObjectTypeConfig> {
        let container = DistinguishedName::parse(&self.container).map_err(|err| {
            Error::ConfigError(format!("type `{}`: invalid container: {err}", self.name))
        })?;

        let primary_key = self.primary_key.ok_or_else(|| {
            Error::ConfigError(format!("type `{}` declares no primary key", self.name))
        })?;
        let primary_key_index = self
            .attributes
            .iter()
            .position(|spec| spec.name == primary_key && spec.cardinality == Cardinality::Single);
        let Some(primary_key_index) = primary_key_index else {
            return Err(Error::ConfigError(format!(
                "type `{}`: primary key `{primary_key}` must be single-valued",
                self.name
            )));
        };

        if self.object_classes.is_empty() {
            return Err(Error::ConfigError(format!(
                "type `{}` declares no object classes",
                self.name
            )));
        }

        let mut keys = HashSet::new();
        let mut names = HashSet::new();
        let reserved = self
            .relations
            .iter()
            .map(|relation| relation.attribute.as_str())
            .chain(self.unique_id_attribute.as_deref())
            .chain(std::iter::once(ipa_core::entry::OBJECT_CLASS_ATTRIBUTE));
        for key in reserved {
            if !keys.insert(key.to_string()) {
                return Err(Error::ConfigError(format!(
                    "type `{}`: storage key `{key}` declared twice",
                    self.name
                )));
            }
        }
        for spec in &self.attributes {
            if !names.insert(spec.name.as_str()) || !keys.insert(spec.storage_key.clone()) {
                return Err(Error::ConfigError(format!(
                    "type `{}`: attribute `{}` collides with another declaration",
                    self.name, spec.name
                )));
            }
        }

        let mut relation_names = HashSet::new();
        if let Some(dup) = self
            .relations
            .iter()
            .find(|relation| !relation_names.insert(relation.name.as_str()))
        {
            return Err(Error::ConfigError(format!(
                "type `{}`: relation `{}` declared twice",
                self.name, dup.name
            )));
        }

        Ok(ObjectTypeConfig {
            name: self.name,
            object_name: self.object_name,
            object_name_plural: self.object_name_plural,
            label: self.label,
            container,
            object_classes: self.object_classes,
            primary_key: primary_key_index,
            unique_id_attribute: self.unique_id_attribute,
            attributes: self.attributes,
            relations: self.relations,
            default_attributes: self.default_attributes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget_group() -> ObjectTypeConfigBuilder {
        ObjectTypeConfig::builder("widgetgroup", "cn=widgetgroups")
            .object_classes(&["widgetgroup"])
            .primary_key(AttributeSpec::single("cn").normalizer(lowercase))
            .attribute(AttributeSpec::single("description").required())
            .relation(RelationSpec::managed("member", "member", "memberof", &["widget"]))
    }

    #[test]
    fn primary_key_is_required_and_immutable() {
        let config = widget_group().build().unwrap();
        let pk = config.primary_key();
        assert_eq!(pk.name(), "cn");
        assert!(pk.is_required());
        assert!(!pk.is_mutable());
        assert_eq!(config.normalize_primary_key("Login").unwrap(), "login");
        assert!(config.normalize_primary_key("  ").unwrap_err().is_validation());
    }

    #[test]
    fn missing_primary_key_is_rejected() {
        let err = ObjectTypeConfig::builder("widget", "cn=widgets")
            .object_classes(&["widget"])
            .attribute(AttributeSpec::single("cn"))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn multi_valued_primary_key_is_rejected() {
        let err = ObjectTypeConfig::builder("widget", "cn=widgets")
            .object_classes(&["widget"])
            .primary_key(AttributeSpec::multi("cn"))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn colliding_storage_keys_are_rejected() {
        let err = widget_group()
            .attribute(AttributeSpec::multi("members").storage_key("member"))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn flags_shape_searchable_attributes() {
        let config = widget_group()
            .attribute(AttributeSpec::single("secret").no_search().no_create())
            .build()
            .unwrap();
        let searchable = config
            .searchable_attributes()
            .map(AttributeSpec::name)
            .collect::<Vec<_>>();
        assert_eq!(searchable, vec!["cn", "description"]);
        assert!(!config.attribute("secret").unwrap().is_creatable());
    }

    #[test]
    fn relation_lookup() {
        let config = widget_group()
            .relation(RelationSpec::mirrored("memberof", "memberOf", "member", &["widgetgroup"]))
            .build()
            .unwrap();
        let member = config.relation("member").unwrap();
        assert!(member.is_managed());
        assert!(member.allows("widget"));
        assert!(!member.allows("host"));
        let memberof = config.relation_by_attribute("MEMBEROF").unwrap();
        assert!(!memberof.is_managed());
        assert_eq!(memberof.reverse_attribute(), "member");
    }
}
