//! Registry of entity type configurations.
//!
//! Built once at startup, validated as a whole, then shared read-only through an [`Arc`].

use ipa_core::{DistinguishedName, Error, RelativeDistinguishedName, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::schema::ObjectTypeConfig;

/// Frozen set of entity type configurations rooted under one directory suffix.
#[derive(Debug)]
pub struct ObjectRegistry {
    base_dn: DistinguishedName,
    types: BTreeMap<String, Arc<ObjectTypeConfig>>,
    containers: BTreeMap<String, DistinguishedName>,
}

impl ObjectRegistry {
    /// Starts a registry rooted at `base_dn`.
    #[must_use]
    pub fn builder(base_dn: DistinguishedName) -> ObjectRegistryBuilder {
        ObjectRegistryBuilder {
            base_dn,
            types: Vec::new(),
        }
    }

    /// Directory suffix.
    #[must_use]
    pub const fn base_dn(&self) -> &DistinguishedName {
        &self.base_dn
    }

    /// Looks up a type configuration.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<ObjectTypeConfig>> {
        self.types.get(name)
    }

    /// Looks up a type configuration or fails with [`Error::InvalidRequest`].
    ///
    /// # Errors
    ///
    /// Returns an error if no type named `name` is registered.
    pub fn require(&self, name: &str) -> Result<&Arc<ObjectTypeConfig>> {
        self.get(name)
            .ok_or_else(|| Error::InvalidRequest(format!("unknown object type `{name}`")))
    }

    /// Iterates over all registered types.
    pub fn types(&self) -> impl Iterator<Item = &Arc<ObjectTypeConfig>> + '_ {
        self.types.values()
    }

    /// Absolute container of a registered type.
    #[must_use]
    pub fn container_dn(&self, config: &ObjectTypeConfig) -> DistinguishedName {
        self.containers
            .get(config.name())
            .cloned()
            .unwrap_or_else(|| config.container().clone().join(&self.base_dn))
    }

    /// Location of the entry with an already-normalized primary key.
    #[must_use]
    pub fn entry_dn(&self, config: &ObjectTypeConfig, key: &str) -> DistinguishedName {
        self.container_dn(config)
            .with_prefix(RelativeDistinguishedName::new(config.primary_key().key(), key))
    }

    /// Identifies which of `candidates` owns `dn` and returns its primary key value.
    ///
    /// An entry belongs to a type when it sits directly in that type's container and its
    /// RDN uses the type's primary key attribute.
    #[must_use]
    pub fn classify<'a>(
        &self,
        dn: &DistinguishedName,
        candidates: impl IntoIterator<Item = &'a String>,
    ) -> Option<(Arc<ObjectTypeConfig>, String)> {
        let rdn = dn.rdn()?;
        let parent = dn.parent()?;
        candidates.into_iter().find_map(|name| {
            let config = self.types.get(name)?;
            let container = self.containers.get(name)?;
            (parent.matches(container) && rdn.matches_attribute(config.primary_key().key()))
                .then(|| (Arc::clone(config), rdn.value().to_string()))
        })
    }

    /// Storage keys of every relation attribute across all registered types.
    #[must_use]
    pub fn relation_attributes(&self) -> Vec<String> {
        let mut attributes = self
            .types
            .values()
            .flat_map(|config| config.relations().iter().map(|r| r.attribute().to_string()))
            .collect::<Vec<_>>();
        attributes.sort();
        attributes.dedup();
        attributes
    }
}

/// Collects type configurations before freezing them into an [`ObjectRegistry`].
#[derive(Debug)]
pub struct ObjectRegistryBuilder {
    base_dn: DistinguishedName,
    types: Vec<ObjectTypeConfig>,
}

impl ObjectRegistryBuilder {
    /// Adds a type configuration.
    #[must_use]
    pub fn register(mut self, config: ObjectTypeConfig) -> Self {
        self.types.push(config);
        self
    }

    /// Validates cross-type references and freezes the registry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] when a type name is registered twice, a relation targets
    /// an unregistered type, or a managed relation's target lacks the matching reverse
    /// relation.
    pub fn build(self) -> Result<Arc<ObjectRegistry>> {
        let mut types = BTreeMap::new();
        for config in self.types {
            let name = config.name().to_string();
            if types.insert(name.clone(), Arc::new(config)).is_some() {
                return Err(Error::ConfigError(format!(
                    "object type `{name}` registered twice"
                )));
            }
        }

        for config in types.values() {
            for relation in config.relations() {
                for target in relation.targets() {
                    let Some(target_config) = types.get(target) else {
                        return Err(Error::ConfigError(format!(
                            "type `{}`: relation `{}` targets unregistered type `{target}`",
                            config.name(),
                            relation.name()
                        )));
                    };
                    let mirrored = target_config
                        .relation_by_attribute(relation.reverse_attribute())
                        .is_some();
                    if relation.is_managed() && !mirrored {
                        return Err(Error::ConfigError(format!(
                            "type `{target}` does not declare `{}` required by `{}.{}`",
                            relation.reverse_attribute(),
                            config.name(),
                            relation.name()
                        )));
                    }
                }
            }
        }

        let containers = types
            .iter()
            .map(|(name, config)| {
                (
                    name.clone(),
                    config.container().clone().join(&self.base_dn),
                )
            })
            .collect();

        Ok(Arc::new(ObjectRegistry {
            base_dn: self.base_dn,
            types,
            containers,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{lowercase, AttributeSpec, RelationSpec};

    fn base() -> DistinguishedName {
        DistinguishedName::parse("dc=example,dc=com").unwrap()
    }

    fn leaf() -> ObjectTypeConfig {
        ObjectTypeConfig::builder("widget", "cn=widgets")
            .object_classes(&["widget"])
            .primary_key(AttributeSpec::single("cn").normalizer(lowercase))
            .relation(RelationSpec::mirrored("memberof", "memberof", "member", &["widgetgroup"]))
            .build()
            .unwrap()
    }

    fn group() -> ObjectTypeConfig {
        ObjectTypeConfig::builder("widgetgroup", "cn=widgetgroups")
            .object_classes(&["widgetgroup"])
            .primary_key(AttributeSpec::single("cn").normalizer(lowercase))
            .relation(RelationSpec::managed(
                "member",
                "member",
                "memberof",
                &["widget", "widgetgroup"],
            ))
            .relation(RelationSpec::mirrored("memberof", "memberof", "member", &["widgetgroup"]))
            .build()
            .unwrap()
    }

    #[test]
    fn entry_dn_and_classification() {
        let registry = ObjectRegistry::builder(base())
            .register(leaf())
            .register(group())
            .build()
            .unwrap();
        let widget = registry.get("widget").unwrap();
        let dn = registry.entry_dn(widget, "gear");
        assert_eq!(dn.as_str(), "cn=gear,cn=widgets,dc=example,dc=com");

        let candidates = vec!["widgetgroup".to_string(), "widget".to_string()];
        let upper = DistinguishedName::parse("CN=gear,CN=Widgets,DC=example,DC=com").unwrap();
        let (config, key) = registry.classify(&upper, &candidates).unwrap();
        assert_eq!(config.name(), "widget");
        assert_eq!(key, "gear");

        let foreign = DistinguishedName::parse("cn=gear,cn=other,dc=example,dc=com").unwrap();
        assert!(registry.classify(&foreign, &candidates).is_none());
        assert_eq!(registry.relation_attributes(), vec!["member", "memberof"]);
    }

    #[test]
    fn duplicate_types_are_rejected() {
        let err = ObjectRegistry::builder(base())
            .register(leaf())
            .register(leaf())
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn unregistered_targets_are_rejected() {
        let err = ObjectRegistry::builder(base())
            .register(group())
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::ConfigError(msg) if msg.contains("widget")));
    }

    #[test]
    fn managed_relation_needs_reverse_side() {
        let bare_leaf = ObjectTypeConfig::builder("widget", "cn=widgets")
            .object_classes(&["widget"])
            .primary_key(AttributeSpec::single("cn"))
            .build()
            .unwrap();
        let err = ObjectRegistry::builder(base())
            .register(bare_leaf)
            .register(group())
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::ConfigError(msg) if msg.contains("memberof")));
    }
}
