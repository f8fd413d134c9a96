//! Mapping between business objects and raw directory entries.

use ipa_core::entry::OBJECT_CLASS_ATTRIBUTE;
use ipa_core::{DistinguishedName, Entry, Error, Result, UniqueId};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::object::{membership_key, AttributeValue, BusinessObject};
use crate::registry::ObjectRegistry;
use crate::schema::{Cardinality, ObjectTypeConfig};

/// Encodes `object` into an entry for storage.
///
/// Values are normalized and empty strings dropped. Attributes and relations the schema does
/// not declare are ignored.
///
/// # Errors
///
/// Returns [`Error::CardinalityError`] when a single-valued attribute holds several values and
/// [`Error::ValidationError`] when a required attribute is missing.
pub fn encode(object: &BusinessObject, config: &ObjectTypeConfig) -> Result<Entry> {
    let mut entry = Entry::new(object.dn.clone());
    entry.set_values(OBJECT_CLASS_ATTRIBUTE, config.object_classes().to_vec());

    if let (Some(attribute), Some(id)) = (config.unique_id_attribute(), object.unique_id) {
        entry.set_values(attribute, vec![id.to_string()]);
    }

    for (name, value) in &object.attributes {
        let Some(spec) = config.attribute(name) else {
            debug!(object_type = config.name(), attribute = %name, "dropping undeclared attribute");
            continue;
        };
        let values = value
            .values()
            .into_iter()
            .map(|v| spec.normalize(v))
            .filter(|v| !v.trim().is_empty())
            .collect::<Vec<_>>();
        if spec.cardinality() == Cardinality::Single && values.len() > 1 {
            return Err(Error::CardinalityError {
                attribute: spec.name().to_string(),
                count: values.len(),
            });
        }
        entry.add_values(spec.key(), values);
    }

    if let Some(missing) = config
        .attributes()
        .iter()
        .find(|spec| spec.is_required() && entry.values(spec.key()).is_none())
    {
        return Err(Error::ValidationError(format!(
            "{} attribute `{}` is required",
            config.object_name(),
            missing.name()
        )));
    }

    for (name, dns) in &object.relations {
        let Some(relation) = config.relation(name) else {
            debug!(object_type = config.name(), relation = %name, "dropping undeclared relation");
            continue;
        };
        let values = dns.iter().map(|dn| dn.as_str().to_string()).collect();
        entry.add_values(relation.attribute(), values);
    }

    Ok(entry)
}

/// Decodes an entry into a business object.
///
/// Unknown attributes are ignored and absent attributes stay absent. Malformed stored data
/// is logged and skipped rather than rejected.
#[must_use]
pub fn decode(entry: &Entry, config: &ObjectTypeConfig) -> BusinessObject {
    let mut object = BusinessObject::new(config.name(), entry.dn.clone());

    if let Some(raw) = config
        .unique_id_attribute()
        .and_then(|attribute| entry.first(attribute))
    {
        match UniqueId::parse_str(raw) {
            Ok(id) => object.unique_id = Some(id),
            Err(_) => warn!(dn = %entry.dn, value = raw, "ignoring malformed unique identifier"),
        }
    }

    for spec in config.attributes() {
        let Some(values) = entry.values(spec.key()).filter(|v| !v.is_empty()) else {
            continue;
        };
        let value = match spec.cardinality() {
            Cardinality::Single => {
                if values.len() > 1 {
                    warn!(
                        dn = %entry.dn,
                        attribute = spec.name(),
                        count = values.len(),
                        "single-valued attribute holds several values, keeping the first"
                    );
                }
                AttributeValue::Single(values[0].clone())
            }
            Cardinality::Multi => AttributeValue::Multi(values.to_vec()),
        };
        object.attributes.insert(spec.name().to_string(), value);
    }

    for relation in config.relations() {
        let Some(values) = entry.values(relation.attribute()) else {
            continue;
        };
        let dns = values
            .iter()
            .filter_map(|raw| match DistinguishedName::parse(raw) {
                Ok(dn) => Some(dn),
                Err(err) => {
                    warn!(dn = %entry.dn, value = %raw, "skipping unparsable reference: {err}");
                    None
                }
            })
            .collect::<Vec<_>>();
        if !dns.is_empty() {
            object.relations.insert(relation.name().to_string(), dns);
        }
    }

    object
}

/// Fills the per-type membership views of `object` from its relations.
///
/// References that do not resolve to a registered target type are left out of the views.
pub fn describe_membership(
    object: &mut BusinessObject,
    config: &ObjectTypeConfig,
    registry: &ObjectRegistry,
) {
    let mut views = BTreeMap::<String, Vec<String>>::new();
    for relation in config.relations() {
        for dn in object.members(relation.name()) {
            match registry.classify(dn, relation.targets()) {
                Some((target, key)) => views
                    .entry(membership_key(relation.name(), target.name()))
                    .or_default()
                    .push(key),
                None => debug!(dn = %dn, relation = relation.name(), "unclassified reference"),
            }
        }
    }
    for keys in views.values_mut() {
        keys.sort();
    }
    object.membership = views;
}
