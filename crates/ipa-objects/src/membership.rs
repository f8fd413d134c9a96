//! Paired `member`/`memberof` maintenance.
//!
//! Every edge is written forward first (on the container) and then in reverse (on the
//! member). When the reverse write fails the forward write is retracted, so a batch never
//! leaves an unreported one-sided edge behind.

use ipa_core::{DirectoryModification, DistinguishedName, Entry, Error, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::codec::{decode, describe_membership};
use crate::context::{not_found, EngineContext};
use crate::object::BusinessObject;
use crate::schema::{ObjectTypeConfig, RelationSpec};
use crate::summary::{mutation_summary, OperationKind};

/// Typed reference to a requested member.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct MemberRef {
    /// Member entity type.
    pub member_type: String,
    /// Primary key as requested by the caller.
    pub key: String,
}

impl MemberRef {
    /// Creates a member reference.
    #[must_use]
    pub fn new(member_type: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            member_type: member_type.into(),
            key: key.into(),
        }
    }
}

/// A member the batch could not process, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberFailure {
    /// Member that failed.
    pub member: MemberRef,
    /// Reason.
    pub error: Error,
}

/// Outcome of a batch membership call.
#[derive(Debug, Clone, PartialEq)]
pub struct MembershipResult {
    /// Members whose edge was written (or removed) on both sides.
    pub completed: Vec<MemberRef>,
    /// Members that failed, in request order.
    pub failed: Vec<MemberFailure>,
    /// Container as read back after the batch. When that read fails after the batch ran, the
    /// container as loaded before the batch.
    pub object: BusinessObject,
    /// Primary key of the container.
    pub value: String,
    /// Rendered summary.
    pub summary: String,
}

impl MembershipResult {
    /// Returns the error recorded for a member, if it failed.
    #[must_use]
    pub fn failure(&self, member_type: &str, key: &str) -> Option<&Error> {
        self.failed
            .iter()
            .find(|f| f.member.member_type == member_type && f.member.key == key)
            .map(|f| &f.error)
    }

    /// Returns true when no member failed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Add,
    Remove,
}

/// Batch add/remove of members through a managed relation.
#[derive(Clone)]
pub struct MembershipManager {
    context: Arc<EngineContext>,
}

impl MembershipManager {
    pub(crate) const fn new(context: Arc<EngineContext>) -> Self {
        Self { context }
    }

    /// Adds members to the container keyed by `key`.
    ///
    /// `members` maps a member type name to the keys of that type. Each member is processed
    /// independently; per-member failures are reported in the result.
    ///
    /// # Errors
    ///
    /// Fails outright only when the relation is unknown or read-only, or the container does
    /// not exist.
    #[instrument(skip(self, config, members), fields(object_type = config.name()))]
    pub async fn add_members(
        &self,
        config: &ObjectTypeConfig,
        key: &str,
        relation: &str,
        members: &BTreeMap<String, Vec<String>>,
    ) -> Result<MembershipResult> {
        self.apply(config, key, relation, members, Direction::Add)
            .await
    }

    /// Removes members from the container keyed by `key`.
    ///
    /// # Errors
    ///
    /// Fails outright only when the relation is unknown or read-only, or the container does
    /// not exist.
    #[instrument(skip(self, config, members), fields(object_type = config.name()))]
    pub async fn remove_members(
        &self,
        config: &ObjectTypeConfig,
        key: &str,
        relation: &str,
        members: &BTreeMap<String, Vec<String>>,
    ) -> Result<MembershipResult> {
        self.apply(config, key, relation, members, Direction::Remove)
            .await
    }

    async fn apply(
        &self,
        config: &ObjectTypeConfig,
        key: &str,
        relation_name: &str,
        members: &BTreeMap<String, Vec<String>>,
        direction: Direction,
    ) -> Result<MembershipResult> {
        let relation = managed_relation(config, relation_name)?;
        let key = config.normalize_primary_key(key)?;
        let loaded = self.context.load(config, &key).await?;
        let container = loaded.dn.clone();
        let deadline = Instant::now() + self.context.config.batch_timeout();

        let mut completed = Vec::new();
        let mut failed = Vec::new();
        for (member_type, keys) in members {
            for member_key in keys {
                let member = MemberRef::new(member_type, member_key);
                let outcome = if Instant::now() >= deadline {
                    Err(Error::Timeout(format!(
                        "batch deadline of {}s passed before member was processed",
                        self.context.config.batch_timeout_secs
                    )))
                } else {
                    match direction {
                        Direction::Add => self.add_one(relation, &container, &member).await,
                        Direction::Remove => self.remove_one(relation, &container, &member).await,
                    }
                };
                match outcome {
                    Ok(()) => completed.push(member),
                    Err(error) => {
                        debug!(member_type = %member.member_type, key = %member.key, %error, "member failed");
                        failed.push(MemberFailure { member, error });
                    }
                }
            }
        }

        // A failed read-back falls back to the container as loaded; the ledger is still returned.
        let refreshed = match self.current_container(&container).await {
            Ok(entry) => entry,
            Err(err) => {
                warn!(
                    dn = %container,
                    completed = ?completed,
                    %err,
                    "could not re-read container after membership batch"
                );
                loaded
            }
        };
        let mut object = decode(&refreshed, config);
        describe_membership(&mut object, config, &self.context.registry);

        let kind = match direction {
            Direction::Add => OperationKind::AddMember,
            Direction::Remove => OperationKind::RemoveMember,
        };
        info!(
            dn = %container,
            relation = relation.name(),
            completed = completed.len(),
            failed = failed.len(),
            "membership batch finished"
        );
        Ok(MembershipResult {
            summary: mutation_summary(kind, config.object_name(), &key, completed.len()),
            completed,
            failed,
            object,
            value: key,
        })
    }

    fn resolve_member(
        &self,
        relation: &RelationSpec,
        member: &MemberRef,
    ) -> Result<(Arc<ObjectTypeConfig>, String, DistinguishedName)> {
        if !relation.allows(&member.member_type) {
            return Err(Error::UnsupportedMemberType {
                relation: relation.name().to_string(),
                member_type: member.member_type.clone(),
            });
        }
        let member_config = Arc::clone(self.context.registry.require(&member.member_type)?);
        let key = member_config.normalize_primary_key(&member.key)?;
        let dn = self.context.registry.entry_dn(&member_config, &key);
        Ok((member_config, key, dn))
    }

    async fn current_container(&self, container: &DistinguishedName) -> Result<Entry> {
        self.context
            .find_entry(container)
            .await?
            .ok_or_else(|| Error::NotFound(format!("entry `{container}` disappeared")))
    }

    async fn add_one(
        &self,
        relation: &RelationSpec,
        container: &DistinguishedName,
        member: &MemberRef,
    ) -> Result<()> {
        let (member_config, key, member_dn) = self.resolve_member(relation, member)?;
        let member_entry = self
            .context
            .find_entry(&member_dn)
            .await?
            .ok_or_else(|| not_found(&member_config, &key))?;

        let container_entry = self.current_container(container).await?;
        if container_entry.has_value(relation.attribute(), member_dn.as_str()) {
            return Err(Error::AlreadyMember(format!(
                "{} \"{key}\" is already a member",
                member_config.object_name()
            )));
        }
        if member_dn.matches(container) {
            return Err(Error::CycleDetected(format!(
                "{} \"{key}\" cannot be a member of itself",
                member_config.object_name()
            )));
        }
        self.ensure_acyclic(relation, container, &member_entry)
            .await?;

        let forward = DirectoryModification::add(relation.attribute(), member_dn.as_str());
        self.context
            .modify_entry(container, std::slice::from_ref(&forward))
            .await
            .map_err(|err| match err {
                Error::AlreadyExists(_) => Error::AlreadyMember(format!(
                    "{} \"{key}\" is already a member",
                    member_config.object_name()
                )),
                other => other,
            })?;

        let reverse = DirectoryModification::add(relation.reverse_attribute(), container.as_str());
        match self.context.modify_entry(&member_dn, &[reverse]).await {
            Ok(()) => {}
            Err(Error::AlreadyExists(_)) => {
                debug!(dn = %member_dn, "reverse reference already present");
            }
            Err(err) => {
                let undo = DirectoryModification::delete(relation.attribute(), member_dn.as_str());
                return Err(self.compensate(container, &member_dn, undo, err).await);
            }
        }
        debug!(container = %container, member = %member_dn, "edge added");
        Ok(())
    }

    async fn remove_one(
        &self,
        relation: &RelationSpec,
        container: &DistinguishedName,
        member: &MemberRef,
    ) -> Result<()> {
        let (member_config, key, member_dn) = self.resolve_member(relation, member)?;
        let member_entry = self.context.find_entry(&member_dn).await?;

        let container_entry = self.current_container(container).await?;
        let stored = container_entry
            .values(relation.attribute())
            .unwrap_or_default()
            .iter()
            .find(|value| value.eq_ignore_ascii_case(member_dn.as_str()))
            .cloned();
        let Some(stored) = stored else {
            return Err(match member_entry {
                None => not_found(&member_config, &key),
                Some(_) => Error::NotMember(format!(
                    "{} \"{key}\" is not a member",
                    member_config.object_name()
                )),
            });
        };

        let forward = DirectoryModification::delete(relation.attribute(), stored.clone());
        self.context
            .modify_entry(container, std::slice::from_ref(&forward))
            .await
            .map_err(|err| match err {
                Error::NotFound(_) => Error::NotMember(format!(
                    "{} \"{key}\" is not a member",
                    member_config.object_name()
                )),
                other => other,
            })?;

        if member_entry.is_none() {
            warn!(container = %container, member = %member_dn, "removed reference to missing entry");
            return Ok(());
        }

        let reverse =
            DirectoryModification::delete(relation.reverse_attribute(), container.as_str());
        match self.context.modify_entry(&member_dn, &[reverse]).await {
            Ok(()) => {}
            Err(Error::NotFound(_)) => {
                warn!(dn = %member_dn, "reverse reference was already missing");
            }
            Err(err) => {
                let undo = DirectoryModification::add(relation.attribute(), stored);
                return Err(self.compensate(container, &member_dn, undo, err).await);
            }
        }
        debug!(container = %container, member = %member_dn, "edge removed");
        Ok(())
    }

    /// Retracts a forward write after its reverse write failed.
    async fn compensate(
        &self,
        container: &DistinguishedName,
        member: &DistinguishedName,
        undo: DirectoryModification,
        cause: Error,
    ) -> Error {
        match self.context.modify_entry(container, &[undo]).await {
            Ok(()) => {
                warn!(container = %container, member = %member, %cause, "reverse write failed, forward write retracted");
                cause
            }
            Err(undo_error) => {
                error!(
                    container = %container,
                    member = %member,
                    %cause,
                    %undo_error,
                    "membership left one-sided"
                );
                Error::InconsistentMembership(format!(
                    "`{container}` and `{member}` disagree after failed write ({cause}); \
                     retraction failed: {undo_error}"
                ))
            }
        }
    }

    /// Rejects the edge if `container` is already reachable from the member.
    async fn ensure_acyclic(
        &self,
        relation: &RelationSpec,
        container: &DistinguishedName,
        member_entry: &Entry,
    ) -> Result<()> {
        let max_depth = self.context.config.max_nesting_depth;
        let mut visited = HashSet::from([member_entry.dn.normalized()]);
        let mut queue = VecDeque::from([(member_entry.clone(), 0_usize)]);

        while let Some((entry, depth)) = queue.pop_front() {
            let Some(values) = entry.values(relation.attribute()) else {
                continue;
            };
            for raw in values {
                let Ok(dn) = DistinguishedName::parse(raw) else {
                    continue;
                };
                if dn.matches(container) {
                    return Err(Error::CycleDetected(format!(
                        "`{}` already contains `{container}` through `{}`",
                        member_entry.dn,
                        relation.name()
                    )));
                }
                if !visited.insert(dn.normalized()) {
                    continue;
                }
                if depth + 1 >= max_depth {
                    return Err(Error::CycleDetected(format!(
                        "nesting below `{}` exceeds {max_depth} levels",
                        member_entry.dn
                    )));
                }
                if let Some(next) = self.context.find_entry(&dn).await? {
                    queue.push_back((next, depth + 1));
                }
            }
        }
        Ok(())
    }
}

fn managed_relation<'a>(config: &'a ObjectTypeConfig, name: &str) -> Result<&'a RelationSpec> {
    let relation = config.relation(name).ok_or_else(|| {
        Error::ValidationError(format!(
            "{} has no relation `{name}`",
            config.object_name()
        ))
    })?;
    if !relation.is_managed() {
        return Err(Error::ValidationError(format!(
            "relation `{name}` of {} is read-only",
            config.object_name()
        )));
    }
    Ok(relation)
}
