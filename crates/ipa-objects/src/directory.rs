//! Caller-facing entry point bound to one registry, backend and configuration.

use ipa_core::{DirectoryBackend, EngineConfig, Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::context::EngineContext;
use crate::membership::{MembershipManager, MembershipResult};
use crate::object::{AttributeValue, BusinessObject, Changes};
use crate::registry::ObjectRegistry;
use crate::repository::{project_defaults, ObjectRepository, SearchRequest, SearchResult};
use crate::schema::ObjectTypeConfig;
use crate::summary::Outcome;

/// Directory object engine.
///
/// ```no_run
/// use ipa_core::{DistinguishedName, EngineConfig, MemoryDirectory};
/// use ipa_objects::{hbac, Directory, ObjectRegistry};
/// use std::sync::Arc;
///
/// # async fn example() -> ipa_core::Result<()> {
/// let config = EngineConfig::new("dc=example,dc=com")?;
/// let registry = hbac::register_hbac(ObjectRegistry::builder(config.parse_base_dn()?))?.build()?;
/// let directory = Directory::new(registry, Arc::new(MemoryDirectory::new()), config)?;
///
/// let groups = directory.object(hbac::HBAC_SERVICE_GROUP)?;
/// let created = groups
///     .create("login", [("description", "login services")])
///     .await?;
/// println!("{}", created.summary);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Directory {
    context: Arc<EngineContext>,
    repository: ObjectRepository,
    membership: MembershipManager,
}

impl Directory {
    /// Creates the engine.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the configuration is invalid or its base DN differs
    /// from the registry's.
    pub fn new(
        registry: Arc<ObjectRegistry>,
        backend: Arc<dyn DirectoryBackend>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate_config()?;
        let base_dn = config.parse_base_dn()?;
        if !base_dn.matches(registry.base_dn()) {
            return Err(Error::ConfigError(format!(
                "engine base DN `{base_dn}` differs from registry base DN `{}`",
                registry.base_dn()
            )));
        }

        let context = Arc::new(EngineContext::new(registry, backend, config));
        Ok(Self {
            repository: ObjectRepository::new(Arc::clone(&context)),
            membership: MembershipManager::new(Arc::clone(&context)),
            context,
        })
    }

    /// Registry the engine was built with.
    #[must_use]
    pub fn registry(&self) -> &Arc<ObjectRegistry> {
        &self.context.registry
    }

    /// Generic CRUD and search operations.
    #[must_use]
    pub const fn repository(&self) -> &ObjectRepository {
        &self.repository
    }

    /// Generic membership operations.
    #[must_use]
    pub const fn membership(&self) -> &MembershipManager {
        &self.membership
    }

    /// Operations bound to one registered type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if no such type is registered.
    pub fn object(&self, object_type: &str) -> Result<ObjectApi<'_>> {
        let config = Arc::clone(self.context.registry.require(object_type)?);
        Ok(ObjectApi {
            directory: self,
            config,
        })
    }
}

/// Operation surface of one entity type.
pub struct ObjectApi<'a> {
    directory: &'a Directory,
    config: Arc<ObjectTypeConfig>,
}

impl ObjectApi<'_> {
    /// Type configuration.
    #[must_use]
    pub fn config(&self) -> &ObjectTypeConfig {
        &self.config
    }

    /// Creates an object.
    ///
    /// # Errors
    ///
    /// See [`ObjectRepository::create`].
    pub async fn create<I, K, V>(&self, key: &str, attributes: I) -> Result<Outcome<BusinessObject>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<AttributeValue>,
    {
        let attributes = attributes
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect::<BTreeMap<_, _>>();
        self.directory
            .repository
            .create(&self.config, key, attributes)
            .await
    }

    /// Reads an object, limited to the type's default attributes unless `all` is set.
    ///
    /// # Errors
    ///
    /// See [`ObjectRepository::retrieve`].
    pub async fn show(&self, key: &str, all: bool) -> Result<BusinessObject> {
        let mut object = self.directory.repository.retrieve(&self.config, key).await?;
        if !all {
            project_defaults(&mut object, &self.config);
        }
        Ok(object)
    }

    /// Modifies an object.
    ///
    /// # Errors
    ///
    /// See [`ObjectRepository::update`].
    pub async fn update(&self, key: &str, changes: &Changes) -> Result<Outcome<BusinessObject>> {
        self.directory
            .repository
            .update(&self.config, key, changes)
            .await
    }

    /// Deletes an object.
    ///
    /// # Errors
    ///
    /// See [`ObjectRepository::delete`].
    pub async fn delete(&self, key: &str) -> Result<Outcome<()>> {
        self.directory.repository.delete(&self.config, key).await
    }

    /// Searches objects of this type.
    ///
    /// # Errors
    ///
    /// See [`ObjectRepository::search`].
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResult> {
        self.directory.repository.search(&self.config, request).await
    }

    /// Adds typed members through `relation`.
    ///
    /// # Errors
    ///
    /// See [`MembershipManager::add_members`].
    pub async fn add_member(
        &self,
        key: &str,
        relation: &str,
        members: &BTreeMap<String, Vec<String>>,
    ) -> Result<MembershipResult> {
        self.directory
            .membership
            .add_members(&self.config, key, relation, members)
            .await
    }

    /// Removes typed members through `relation`.
    ///
    /// # Errors
    ///
    /// See [`MembershipManager::remove_members`].
    pub async fn remove_member(
        &self,
        key: &str,
        relation: &str,
        members: &BTreeMap<String, Vec<String>>,
    ) -> Result<MembershipResult> {
        self.directory
            .membership
            .remove_members(&self.config, key, relation, members)
            .await
    }
}

/// Builds the `type -> keys` map accepted by member operations.
///
/// ```
/// let members = ipa_objects::members([("hbacsvc", &["sshd", "login"][..])]);
/// assert_eq!(members["hbacsvc"], vec!["sshd", "login"]);
/// ```
#[must_use]
pub fn members<'a, I>(groups: I) -> BTreeMap<String, Vec<String>>
where
    I: IntoIterator<Item = (&'a str, &'a [&'a str])>,
{
    let mut map = BTreeMap::<String, Vec<String>>::new();
    for (member_type, keys) in groups {
        map.entry(member_type.to_string())
            .or_default()
            .extend(keys.iter().map(|k| (*k).to_string()));
    }
    map
}
