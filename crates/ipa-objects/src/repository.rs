//! Generic create/retrieve/update/delete/search over registered entity types.

use ipa_core::entry::OBJECT_CLASS_ATTRIBUTE;
use ipa_core::{DirectoryModification, Entry, Error, Filter, Result, UniqueId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::codec::{decode, describe_membership, encode};
use crate::context::{not_found, EngineContext};
use crate::object::{AttributeValue, BusinessObject, Changes};
use crate::schema::ObjectTypeConfig;
use crate::summary::{search_summary, OperationKind, Outcome};

/// Search criteria.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SearchRequest {
    /// Free text matched as a substring against every searchable attribute.
    pub term: Option<String>,
    /// Exact values required on searchable attributes.
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
    /// Maximum number of results; the engine default applies when absent.
    pub size_limit: Option<usize>,
    /// Return only primary keys.
    #[serde(default)]
    pub pkey_only: bool,
    /// Return every attribute instead of the type's defaults.
    #[serde(default)]
    pub all: bool,
}

impl SearchRequest {
    /// Matches everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the free-text term.
    #[must_use]
    pub fn with_term(mut self, term: impl Into<String>) -> Self {
        self.term = Some(term.into());
        self
    }

    /// Requires an exact attribute value.
    #[must_use]
    pub fn with_filter(mut self, attribute: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(attribute.into(), value.into());
        self
    }

    /// Sets the size limit.
    #[must_use]
    pub const fn with_size_limit(mut self, limit: usize) -> Self {
        self.size_limit = Some(limit);
        self
    }

    /// Returns only primary keys.
    #[must_use]
    pub const fn pkey_only(mut self) -> Self {
        self.pkey_only = true;
        self
    }

    /// Returns every attribute.
    #[must_use]
    pub const fn all(mut self) -> Self {
        self.all = true;
        self
    }
}

/// Materialized search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    /// Matching objects ordered by primary key.
    pub objects: Vec<BusinessObject>,
    /// Number of objects returned.
    pub count: usize,
    /// True when more entries matched than the size limit allowed.
    pub truncated: bool,
    /// Rendered summary.
    pub summary: String,
}

impl SearchResult {
    /// Iterates over the returned objects.
    pub fn iter(&self) -> std::slice::Iter<'_, BusinessObject> {
        self.objects.iter()
    }
}

impl IntoIterator for SearchResult {
    type Item = BusinessObject;
    type IntoIter = std::vec::IntoIter<BusinessObject>;

    fn into_iter(self) -> Self::IntoIter {
        self.objects.into_iter()
    }
}

impl<'a> IntoIterator for &'a SearchResult {
    type Item = &'a BusinessObject;
    type IntoIter = std::slice::Iter<'a, BusinessObject>;

    fn into_iter(self) -> Self::IntoIter {
        self.objects.iter()
    }
}

/// CRUD and search operations, generic over an [`ObjectTypeConfig`].
#[derive(Clone)]
pub struct ObjectRepository {
    context: Arc<EngineContext>,
}

impl ObjectRepository {
    pub(crate) const fn new(context: Arc<EngineContext>) -> Self {
        Self { context }
    }

    /// Creates an entry keyed by `key`.
    ///
    /// The primary key may be repeated in `attributes` only with the same normalized value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyExists`] on collision and [`Error::ValidationError`] or
    /// [`Error::CardinalityError`] for invalid input.
    #[instrument(skip(self, config, attributes), fields(object_type = config.name()))]
    pub async fn create(
        &self,
        config: &ObjectTypeConfig,
        key: &str,
        attributes: BTreeMap<String, AttributeValue>,
    ) -> Result<Outcome<BusinessObject>> {
        let key = config.normalize_primary_key(key)?;
        let pk = config.primary_key();
        let dn = self.context.registry.entry_dn(config, &key);

        let mut object = BusinessObject::new(config.name(), dn);
        for (name, value) in attributes {
            if name == pk.name() {
                check_primary_key(config, &key, &value)?;
                continue;
            }
            match config.attribute(&name) {
                Some(spec) if !spec.is_creatable() => {
                    return Err(Error::ValidationError(format!(
                        "attribute `{name}` cannot be set when creating a {}",
                        config.object_name()
                    )));
                }
                Some(_) => {}
                None if config.relation(&name).is_some() => {
                    return Err(Error::ValidationError(format!(
                        "relation `{name}` is managed through member operations"
                    )));
                }
                None => {}
            }
            object.attributes.insert(name, value);
        }
        object
            .attributes
            .insert(pk.name().to_string(), AttributeValue::Single(key.clone()));
        object.unique_id = config.unique_id_attribute().map(|_| UniqueId::generate());

        let entry = encode(&object, config)?;
        self.context
            .create_entry(&entry)
            .await
            .map_err(|err| match err {
                Error::AlreadyExists(_) => Error::AlreadyExists(format!(
                    "{} with name \"{key}\" already exists",
                    config.object_name()
                )),
                other => other,
            })?;
        info!(dn = %entry.dn, "created {}", config.object_name());

        let created = self.present(&entry, config);
        Ok(Outcome::new(
            OperationKind::Create,
            config.object_name(),
            key,
            created,
        ))
    }

    /// Reads the object keyed by `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the entry does not exist.
    #[instrument(skip(self, config), fields(object_type = config.name()))]
    pub async fn retrieve(&self, config: &ObjectTypeConfig, key: &str) -> Result<BusinessObject> {
        let key = config.normalize_primary_key(key)?;
        let entry = self.context.load(config, &key).await?;
        Ok(self.present(&entry, config))
    }

    /// Applies attribute changes to the object keyed by `key`.
    ///
    /// Changes that leave every stored value as it was succeed without writing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the entry does not exist and [`Error::ValidationError`]
    /// when the primary key or another immutable attribute would change.
    #[instrument(skip(self, config, changes), fields(object_type = config.name()))]
    pub async fn update(
        &self,
        config: &ObjectTypeConfig,
        key: &str,
        changes: &Changes,
    ) -> Result<Outcome<BusinessObject>> {
        let key = config.normalize_primary_key(key)?;
        let pk = config.primary_key();
        let stored = self.context.load(config, &key).await?;
        let current = decode(&stored, config);

        let mut updated = current.clone();
        for (name, value) in changes.iter() {
            if name == pk.name() {
                match value {
                    Some(value) => check_primary_key(config, &key, value)?,
                    None => {
                        return Err(Error::ValidationError(format!(
                            "primary key `{name}` cannot be removed"
                        )))
                    }
                }
                continue;
            }
            let Some(spec) = config.attribute(name) else {
                return Err(Error::ValidationError(format!(
                    "{} has no attribute `{name}`",
                    config.object_name()
                )));
            };
            if !spec.is_mutable() {
                return Err(Error::ValidationError(format!(
                    "attribute `{name}` cannot be modified"
                )));
            }
            match value {
                Some(value) => updated.attributes.insert(name.to_string(), value.clone()),
                None => updated.attributes.remove(name),
            };
        }

        let target = encode(&updated, config)?;
        let modifications = attribute_deltas(config, &stored, &target);
        if modifications.is_empty() {
            debug!(dn = %stored.dn, "update leaves entry unchanged");
            return Ok(Outcome::new(
                OperationKind::Update,
                config.object_name(),
                key,
                self.present(&stored, config),
            ));
        }

        self.context
            .modify_entry(&stored.dn, &modifications)
            .await?;
        info!(dn = %stored.dn, changed = modifications.len(), "modified {}", config.object_name());

        let refreshed = self.context.load(config, &key).await?;
        Ok(Outcome::new(
            OperationKind::Update,
            config.object_name(),
            key,
            self.present(&refreshed, config),
        ))
    }

    /// Deletes the object keyed by `key` after removing every reference to it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the entry does not exist. A failure while cleaning up
    /// references aborts before the entry is removed.
    #[instrument(skip(self, config), fields(object_type = config.name()))]
    pub async fn delete(&self, config: &ObjectTypeConfig, key: &str) -> Result<Outcome<()>> {
        let key = config.normalize_primary_key(key)?;
        let entry = self.context.load(config, &key).await?;

        self.remove_references(&entry).await?;
        self.context
            .delete_entry(&entry.dn)
            .await
            .map_err(|err| match err {
                Error::NotFound(_) => not_found(config, &key),
                other => other,
            })?;
        info!(dn = %entry.dn, "deleted {}", config.object_name());

        Ok(Outcome::new(
            OperationKind::Delete,
            config.object_name(),
            key,
            (),
        ))
    }

    /// Searches entries of `config` matching `request`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValidationError`] for criteria on unknown or non-searchable attributes
    /// or a zero size limit.
    #[instrument(skip(self, config), fields(object_type = config.name()))]
    pub async fn search(
        &self,
        config: &ObjectTypeConfig,
        request: &SearchRequest,
    ) -> Result<SearchResult> {
        let limit = request
            .size_limit
            .unwrap_or(self.context.config.search_size_limit);
        if limit == 0 {
            return Err(Error::ValidationError(
                "size limit must be at least 1".to_string(),
            ));
        }

        let filter = search_filter(config, request)?;
        let base = self.context.registry.container_dn(config);
        let mut entries = self
            .context
            .search_entries(&base, &filter, limit.checked_add(1))
            .await?;
        let truncated = entries.len() > limit;
        entries.truncate(limit);

        let pk = config.primary_key().name();
        let mut objects = entries
            .iter()
            .filter(|entry| !entry.dn.matches(&base))
            .map(|entry| {
                let mut object = decode(entry, config);
                describe_membership(&mut object, config, &self.context.registry);
                if request.pkey_only {
                    object.project(&[pk.to_string()]);
                } else if !request.all {
                    project_defaults(&mut object, config);
                }
                object
            })
            .collect::<Vec<_>>();
        objects.sort_by(|a, b| a.first(pk).cmp(&b.first(pk)));

        let count = objects.len();
        debug!(count, truncated, "search complete");
        Ok(SearchResult {
            summary: search_summary(
                count,
                config.object_name(),
                config.object_name_plural(),
                truncated,
            ),
            objects,
            count,
            truncated,
        })
    }

    fn present(&self, entry: &Entry, config: &ObjectTypeConfig) -> BusinessObject {
        let mut object = decode(entry, config);
        describe_membership(&mut object, config, &self.context.registry);
        object
    }

    async fn remove_references(&self, entry: &Entry) -> Result<()> {
        let target = entry.dn.as_str();
        let attributes = self.context.registry.relation_attributes();
        if attributes.is_empty() {
            return Ok(());
        }

        let filter = Filter::or(
            attributes
                .iter()
                .map(|attribute| Filter::equals(attribute.as_str(), target))
                .collect(),
        );
        let base = self.context.registry.base_dn().clone();
        let referencing = self.context.search_entries(&base, &filter, None).await?;

        for other in referencing.iter().filter(|other| !other.dn.matches(&entry.dn)) {
            let modifications = attributes
                .iter()
                .filter_map(|attribute| {
                    let stored = other
                        .values(attribute)?
                        .iter()
                        .filter(|value| value.eq_ignore_ascii_case(target))
                        .cloned()
                        .collect::<Vec<_>>();
                    (!stored.is_empty()).then(|| DirectoryModification::Delete {
                        attribute: attribute.clone(),
                        values: stored,
                    })
                })
                .collect::<Vec<_>>();
            if modifications.is_empty() {
                continue;
            }
            match self.context.modify_entry(&other.dn, &modifications).await {
                Ok(()) => debug!(dn = %other.dn, "removed reference to {target}"),
                Err(Error::NotFound(_)) => {
                    warn!(dn = %other.dn, "reference to {target} vanished during cleanup");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

/// Applies the type's default attribute list, if it declares one.
pub(crate) fn project_defaults(object: &mut BusinessObject, config: &ObjectTypeConfig) {
    if !config.default_attributes().is_empty() {
        object.project(config.default_attributes());
    }
}

fn check_primary_key(config: &ObjectTypeConfig, key: &str, value: &AttributeValue) -> Result<()> {
    let pk = config.primary_key();
    let requested = value.values();
    if requested.len() == 1 && pk.normalize(requested[0]) == key {
        return Ok(());
    }
    Err(Error::ValidationError(format!(
        "primary key `{}` of {} \"{key}\" cannot be changed",
        pk.name(),
        config.object_name()
    )))
}

fn attribute_deltas(
    config: &ObjectTypeConfig,
    stored: &Entry,
    target: &Entry,
) -> Vec<DirectoryModification> {
    config
        .attributes()
        .iter()
        .filter(|spec| spec.is_mutable())
        .filter_map(|spec| {
            let before = sorted(stored.values(spec.key()));
            let after = sorted(target.values(spec.key()));
            (before != after).then(|| DirectoryModification::Replace {
                attribute: spec.key().to_string(),
                values: target.values(spec.key()).unwrap_or_default().to_vec(),
            })
        })
        .collect()
}

fn sorted(values: Option<&[String]>) -> Vec<&str> {
    let mut values = values
        .unwrap_or_default()
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>();
    values.sort_unstable();
    values
}

fn search_filter(config: &ObjectTypeConfig, request: &SearchRequest) -> Result<Filter> {
    let mut clauses = config
        .object_classes()
        .iter()
        .map(|class| Filter::equals(OBJECT_CLASS_ATTRIBUTE, class.as_str()))
        .collect::<Vec<_>>();

    if let Some(term) = request.term.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        let alternatives = config
            .searchable_attributes()
            .map(|spec| Filter::contains(spec.key(), spec.normalize(term)))
            .collect::<Vec<_>>();
        if !alternatives.is_empty() {
            clauses.push(Filter::or(alternatives));
        }
    }

    for (name, value) in &request.filters {
        let Some(spec) = config.attribute(name) else {
            return Err(Error::ValidationError(format!(
                "{} has no attribute `{name}`",
                config.object_name()
            )));
        };
        if !spec.is_searchable() {
            return Err(Error::ValidationError(format!(
                "attribute `{name}` is not searchable"
            )));
        }
        clauses.push(Filter::equals(spec.key(), spec.normalize(value)));
    }

    Ok(Filter::and(clauses))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hbac;

    fn group() -> ObjectTypeConfig {
        hbac::hbac_service_group().unwrap()
    }

    #[test]
    fn search_filter_combines_classes_term_and_filters() {
        let request = SearchRequest::new()
            .with_term("Login")
            .with_filter("cn", "SUDO");
        let filter = search_filter(&group(), &request).unwrap();
        assert_eq!(
            filter.to_ldap_string(),
            "(&(objectclass=ipaobject)(objectclass=ipahbacservicegroup)\
             (|(cn=*login*)(description=*Login*))(cn=sudo))"
        );
    }

    #[test]
    fn search_filter_rejects_unknown_attributes() {
        let request = SearchRequest::new().with_filter("shoe_size", "44");
        let err = search_filter(&group(), &request).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn deltas_ignore_order_and_unchanged_values() {
        let config = group();
        let dn = ipa_core::DistinguishedName::parse(
            "cn=sudo,cn=hbacservicegroups,cn=hbac,dc=example,dc=com",
        )
        .unwrap();
        let stored = Entry::from_attributes(
            dn.clone(),
            vec![
                ("cn", vec!["sudo".to_string()]),
                ("description", vec!["old".to_string()]),
            ],
        );
        let same = stored.clone();
        assert!(attribute_deltas(&config, &stored, &same).is_empty());

        let changed = Entry::from_attributes(
            dn,
            vec![
                ("cn", vec!["sudo".to_string()]),
                ("description", vec!["new".to_string()]),
            ],
        );
        assert_eq!(
            attribute_deltas(&config, &stored, &changed),
            vec![DirectoryModification::Replace {
                attribute: "description".into(),
                values: vec!["new".into()],
            }]
        );
    }

    #[test]
    fn primary_key_check_accepts_equivalent_values() {
        let config = group();
        assert!(check_primary_key(&config, "sudo", &"SUDO".into()).is_ok());
        assert!(check_primary_key(&config, "sudo", &"login".into())
            .unwrap_err()
            .is_validation());
    }
}
