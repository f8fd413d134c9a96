//! Search filters.
//!
//! A [`Filter`] is rendered to RFC 4515 syntax for LDAP backends and evaluated directly by
//! the in-memory backend. Matching is case-insensitive, mirroring the `caseIgnore` matching
//! rules used by the attributes this engine manages.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::entry::Entry;

/// Search filter over entry attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Filter {
    /// Attribute holds exactly this value.
    Equality {
        /// Attribute name.
        attribute: String,
        /// Expected value.
        value: String,
    },
    /// Attribute holds a value containing this substring.
    Substring {
        /// Attribute name.
        attribute: String,
        /// Substring to look for.
        value: String,
    },
    /// Attribute has at least one value.
    Present(String),
    /// All sub-filters match.
    And(Vec<Filter>),
    /// At least one sub-filter matches.
    Or(Vec<Filter>),
    /// Sub-filter does not match.
    Not(Box<Filter>),
}

impl Filter {
    /// Equality filter.
    #[must_use]
    pub fn equals(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Equality {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Substring filter.
    #[must_use]
    pub fn contains(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Substring {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Presence filter.
    #[must_use]
    pub fn present(attribute: impl Into<String>) -> Self {
        Self::Present(attribute.into())
    }

    /// Conjunction, flattening trivial cases.
    #[must_use]
    pub fn and(mut filters: Vec<Filter>) -> Self {
        if filters.len() == 1 {
            return filters.remove(0);
        }
        Self::And(filters)
    }

    /// Disjunction, flattening trivial cases.
    #[must_use]
    pub fn or(mut filters: Vec<Filter>) -> Self {
        if filters.len() == 1 {
            return filters.remove(0);
        }
        Self::Or(filters)
    }

    /// Evaluates the filter against an entry.
    #[must_use]
    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            Self::Equality { attribute, value } => entry.has_value(attribute, value),
            Self::Substring { attribute, value } => {
                let needle = value.to_lowercase();
                entry.values(attribute).is_some_and(|values| {
                    values.iter().any(|v| v.to_lowercase().contains(&needle))
                })
            }
            Self::Present(attribute) => entry.values(attribute).is_some_and(|v| !v.is_empty()),
            Self::And(filters) => filters.iter().all(|f| f.matches(entry)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(entry)),
            Self::Not(inner) => !inner.matches(entry),
        }
    }

    /// Renders the filter in LDAP string syntax.
    #[must_use]
    pub fn to_ldap_string(&self) -> String {
        match self {
            Self::Equality { attribute, value } => {
                format!("({attribute}={})", escape_filter_value(value))
            }
            Self::Substring { attribute, value } => {
                format!("({attribute}=*{}*)", escape_filter_value(value))
            }
            Self::Present(attribute) => format!("({attribute}=*)"),
            // An empty AND is absolute true and an empty OR absolute false (RFC 4526).
            Self::And(filters) => format!("(&{})", join(filters)),
            Self::Or(filters) => format!("(|{})", join(filters)),
            Self::Not(inner) => format!("(!{})", inner.to_ldap_string()),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_ldap_string())
    }
}

fn join(filters: &[Filter]) -> String {
    filters.iter().map(Filter::to_ldap_string).collect()
}

/// Escapes a value for inclusion in an LDAP filter.
#[must_use]
pub fn escape_filter_value(value: &str) -> String {
    value
        .chars()
        .flat_map(|ch| match ch {
            '*' => "\\2a".chars().collect::<Vec<_>>(),
            '(' => "\\28".chars().collect(),
            ')' => "\\29".chars().collect(),
            '\\' => "\\5c".chars().collect(),
            '\0' => "\\00".chars().collect(),
            _ => vec![ch],
        })
        .collect::<String>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dn::DistinguishedName;

    fn entry() -> Entry {
        Entry::from_attributes(
            DistinguishedName::parse("cn=login,cn=hbacservicegroups,dc=example,dc=com").unwrap(),
            vec![
                ("objectclass", vec!["ipahbacservicegroup".to_string()]),
                ("cn", vec!["login".to_string()]),
                ("description", vec!["Login Services".to_string()]),
            ],
        )
    }

    #[test]
    fn renders_nested_filters() {
        let filter = Filter::and(vec![
            Filter::equals("objectclass", "ipahbacservicegroup"),
            Filter::or(vec![
                Filter::contains("cn", "log(in)*"),
                Filter::contains("description", "log"),
            ]),
        ]);
        assert_eq!(
            filter.to_string(),
            "(&(objectclass=ipahbacservicegroup)(|(cn=*log\\28in\\29\\2a*)(description=*log*)))"
        );
        assert_eq!(
            Filter::Not(Box::new(Filter::present("member"))).to_ldap_string(),
            "(!(member=*))"
        );
    }

    #[test]
    fn single_element_combinators_collapse() {
        assert_eq!(
            Filter::and(vec![Filter::present("cn")]),
            Filter::present("cn")
        );
        assert_eq!(Filter::or(Vec::new()), Filter::Or(Vec::new()));
    }

    #[test]
    fn evaluates_case_insensitively() {
        let entry = entry();
        assert!(Filter::equals("CN", "LOGIN").matches(&entry));
        assert!(Filter::contains("description", "login serv").matches(&entry));
        assert!(!Filter::present("member").matches(&entry));
        assert!(Filter::and(Vec::new()).matches(&entry));
        assert!(!Filter::Or(Vec::new()).matches(&entry));
        assert!(Filter::Not(Box::new(Filter::equals("cn", "sudo"))).matches(&entry));
    }
}
