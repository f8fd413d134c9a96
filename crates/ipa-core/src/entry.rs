//! Raw directory entries and attribute modifications.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::dn::DistinguishedName;

/// Storage key holding an entry's object classes.
pub const OBJECT_CLASS_ATTRIBUTE: &str = "objectclass";

/// Raw directory record: a distinguished name plus an attribute bag.
///
/// Attribute names are case-insensitive in the directory, so keys are stored lowercased.
/// Values keep the order in which they were written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Distinguished name of the entry.
    pub dn: DistinguishedName,
    attributes: BTreeMap<String, Vec<String>>,
}

impl Entry {
    /// Creates an empty entry at `dn`.
    #[must_use]
    pub fn new(dn: DistinguishedName) -> Self {
        Self {
            dn,
            attributes: BTreeMap::new(),
        }
    }

    /// Creates an entry from an attribute map, lowercasing keys and dropping empty attributes.
    #[must_use]
    pub fn from_attributes<I, K>(dn: DistinguishedName, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<String>)>,
        K: AsRef<str>,
    {
        let mut entry = Self::new(dn);
        for (key, values) in attributes {
            entry.add_values(key.as_ref(), values);
        }
        entry
    }

    /// Returns the first value of the attribute if present.
    #[must_use]
    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.values(attribute)
            .and_then(|values| values.first().map(String::as_str))
    }

    /// Returns all values for the attribute.
    #[must_use]
    pub fn values(&self, attribute: &str) -> Option<&[String]> {
        self.attributes
            .get(&attribute.to_ascii_lowercase())
            .map(Vec::as_slice)
    }

    /// Returns true if the attribute holds `value` (case-insensitive).
    #[must_use]
    pub fn has_value(&self, attribute: &str, value: &str) -> bool {
        self.values(attribute)
            .is_some_and(|values| values.iter().any(|v| v.eq_ignore_ascii_case(value)))
    }

    /// Returns the object classes of the entry.
    #[must_use]
    pub fn object_classes(&self) -> &[String] {
        self.values(OBJECT_CLASS_ATTRIBUTE).unwrap_or_default()
    }

    /// Iterates over attribute names and their values.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &[String])> + '_ {
        self.attributes
            .iter()
            .map(|(key, values)| (key.as_str(), values.as_slice()))
    }

    /// Replaces all values of the attribute. An empty list removes it.
    pub fn set_values(&mut self, attribute: &str, values: Vec<String>) {
        let key = attribute.to_ascii_lowercase();
        if values.is_empty() {
            self.attributes.remove(&key);
        } else {
            self.attributes.insert(key, values);
        }
    }

    /// Appends values not already present (case-insensitive).
    pub fn add_values(&mut self, attribute: &str, values: Vec<String>) {
        if values.is_empty() {
            return;
        }
        let current = self
            .attributes
            .entry(attribute.to_ascii_lowercase())
            .or_default();
        for value in values {
            if !current.iter().any(|v| v.eq_ignore_ascii_case(&value)) {
                current.push(value);
            }
        }
    }

    /// Removes the given values (case-insensitive); an empty list removes the attribute.
    pub fn remove_values(&mut self, attribute: &str, values: &[String]) {
        let key = attribute.to_ascii_lowercase();
        if values.is_empty() {
            self.attributes.remove(&key);
            return;
        }
        if let Some(current) = self.attributes.get_mut(&key) {
            current.retain(|v| !values.iter().any(|gone| gone.eq_ignore_ascii_case(v)));
            if current.is_empty() {
                self.attributes.remove(&key);
            }
        }
    }

    /// Applies a modification in memory without backend-side checks.
    pub fn apply(&mut self, modification: &DirectoryModification) {
        match modification {
            DirectoryModification::Add { attribute, values } => {
                self.add_values(attribute, values.clone());
            }
            DirectoryModification::Delete { attribute, values } => {
                self.remove_values(attribute, values);
            }
            DirectoryModification::Replace { attribute, values } => {
                self.set_values(attribute, values.clone());
            }
        }
    }
}

/// Attribute-level change applied to a single entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectoryModification {
    /// Add attribute values.
    Add {
        /// Attribute to modify.
        attribute: String,
        /// Values to add.
        values: Vec<String>,
    },
    /// Delete attribute values.
    Delete {
        /// Attribute to modify.
        attribute: String,
        /// Values to delete (empty removes attribute).
        values: Vec<String>,
    },
    /// Replace attribute values.
    Replace {
        /// Attribute to modify.
        attribute: String,
        /// Replacement values.
        values: Vec<String>,
    },
}

impl DirectoryModification {
    /// Convenience constructor for adding a single value.
    #[must_use]
    pub fn add(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Add {
            attribute: attribute.into(),
            values: vec![value.into()],
        }
    }

    /// Convenience constructor for deleting a single value.
    #[must_use]
    pub fn delete(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Delete {
            attribute: attribute.into(),
            values: vec![value.into()],
        }
    }

    /// Attribute targeted by the modification.
    #[must_use]
    pub fn attribute(&self) -> &str {
        match self {
            Self::Add { attribute, .. }
            | Self::Delete { attribute, .. }
            | Self::Replace { attribute, .. } => attribute,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Entry {
        let dn = DistinguishedName::parse("cn=login,cn=hbacservicegroups,dc=example,dc=com")
            .unwrap();
        Entry::from_attributes(
            dn,
            vec![
                ("objectClass", vec!["ipaobject".to_string(), "ipahbacservicegroup".to_string()]),
                ("cn", vec!["login".to_string()]),
                ("member", Vec::new()),
            ],
        )
    }

    #[test]
    fn keys_are_case_insensitive() {
        let entry = sample();
        assert_eq!(entry.object_classes().len(), 2);
        assert_eq!(entry.first("CN"), Some("login"));
        assert!(entry.values("member").is_none());
    }

    #[test]
    fn add_and_remove_values_dedupe() {
        let mut entry = sample();
        entry.add_values("member", vec!["cn=sshd,dc=example,dc=com".to_string()]);
        entry.add_values("member", vec!["CN=SSHD,dc=example,dc=com".to_string()]);
        assert_eq!(entry.values("member").unwrap().len(), 1);
        assert!(entry.has_value("member", "cn=sshd,DC=example,dc=com"));

        entry.remove_values("member", &["cn=sshd,dc=example,dc=com".to_string()]);
        assert!(entry.values("member").is_none());
    }

    #[test]
    fn apply_replace_with_empty_removes_attribute() {
        let mut entry = sample();
        entry.apply(&DirectoryModification::Replace {
            attribute: "cn".to_string(),
            values: Vec::new(),
        });
        assert!(entry.first("cn").is_none());
        assert_eq!(
            DirectoryModification::add("member", "x").attribute(),
            "member"
        );
    }
}
