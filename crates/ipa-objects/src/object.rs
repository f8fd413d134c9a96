//! Typed business objects and change sets.

use ipa_core::{DistinguishedName, UniqueId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value of one business attribute, shaped by its cardinality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Value of a single-valued attribute.
    Single(String),
    /// Values of a multi-valued attribute.
    Multi(Vec<String>),
}

impl AttributeValue {
    /// All values as a slice-like vector.
    #[must_use]
    pub fn values(&self) -> Vec<&str> {
        match self {
            Self::Single(value) => vec![value.as_str()],
            Self::Multi(values) => values.iter().map(String::as_str).collect(),
        }
    }

    /// First value, if any.
    #[must_use]
    pub fn first(&self) -> Option<&str> {
        match self {
            Self::Single(value) => Some(value),
            Self::Multi(values) => values.first().map(String::as_str),
        }
    }

    /// Consumes the value into its parts.
    #[must_use]
    pub fn into_values(self) -> Vec<String> {
        match self {
            Self::Single(value) => vec![value],
            Self::Multi(values) => values,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(values: Vec<String>) -> Self {
        Self::Multi(values)
    }
}

impl From<Vec<&str>> for AttributeValue {
    fn from(values: Vec<&str>) -> Self {
        Self::Multi(values.into_iter().map(str::to_string).collect())
    }
}

/// Typed view of a directory entry for one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BusinessObject {
    /// Entity type name.
    pub object_type: String,
    /// Location of the backing entry.
    #[serde(serialize_with = "serialize_dn")]
    pub dn: DistinguishedName,
    /// System-generated identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<UniqueId>,
    /// Attribute values keyed by attribute name.
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Referenced entries keyed by relation name.
    #[serde(serialize_with = "serialize_relations")]
    pub relations: BTreeMap<String, Vec<DistinguishedName>>,
    /// Referenced primary keys keyed by `{relation}_{type}`, e.g. `member_hbacsvc`.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub membership: BTreeMap<String, Vec<String>>,
}

impl BusinessObject {
    /// Creates an object with no attributes.
    #[must_use]
    pub fn new(object_type: impl Into<String>, dn: DistinguishedName) -> Self {
        Self {
            object_type: object_type.into(),
            dn,
            unique_id: None,
            attributes: BTreeMap::new(),
            relations: BTreeMap::new(),
            membership: BTreeMap::new(),
        }
    }

    /// Sets an attribute, returning the object for chaining.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Returns an attribute value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Returns the first value of an attribute.
    #[must_use]
    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(AttributeValue::first)
    }

    /// Entries referenced through `relation`.
    #[must_use]
    pub fn members(&self, relation: &str) -> &[DistinguishedName] {
        self.relations.get(relation).map_or(&[], Vec::as_slice)
    }

    /// Returns true if `dn` is referenced through `relation` (case-insensitive).
    #[must_use]
    pub fn has_member(&self, relation: &str, dn: &DistinguishedName) -> bool {
        self.members(relation).iter().any(|member| member.matches(dn))
    }

    /// Primary keys of `member_type` entries referenced through `relation`.
    #[must_use]
    pub fn member_keys(&self, relation: &str, member_type: &str) -> &[String] {
        self.membership
            .get(&membership_key(relation, member_type))
            .map_or(&[], Vec::as_slice)
    }

    /// Keeps only the named attributes and relations.
    ///
    /// Membership views follow their relation.
    pub fn project(&mut self, names: &[String]) {
        let keep = |name: &String| names.iter().any(|n| n == name);
        self.attributes.retain(|name, _| keep(name));
        self.relations.retain(|name, _| keep(name));
        self.membership.retain(|view, _| {
            names
                .iter()
                .any(|n| view.strip_prefix(n.as_str()).is_some_and(|rest| rest.starts_with('_')))
        });
    }
}

/// Name of the per-type membership view of a relation.
#[must_use]
pub fn membership_key(relation: &str, member_type: &str) -> String {
    format!("{relation}_{member_type}")
}

fn serialize_dn<S>(dn: &DistinguishedName, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(dn.as_str())
}

fn serialize_relations<S>(
    relations: &BTreeMap<String, Vec<DistinguishedName>>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    use serde::ser::SerializeMap;
    let mut map = serializer.serialize_map(Some(relations.len()))?;
    for (name, dns) in relations {
        let rendered = dns.iter().map(DistinguishedName::as_str).collect::<Vec<_>>();
        map.serialize_entry(name, &rendered)?;
    }
    map.end()
}

/// Requested attribute changes for an update.
///
/// `None` clears the attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Changes {
    entries: BTreeMap<String, Option<AttributeValue>>,
}

impl Changes {
    /// Empty change set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an attribute to a new value.
    #[must_use]
    pub fn set(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.entries.insert(name.into(), Some(value.into()));
        self
    }

    /// Removes an attribute.
    #[must_use]
    pub fn clear(mut self, name: impl Into<String>) -> Self {
        self.entries.insert(name.into(), None);
        self
    }

    /// Returns true when nothing is requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over requested changes.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&AttributeValue>)> + '_ {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_ref()))
    }
}
