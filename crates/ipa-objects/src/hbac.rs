//! HBAC service and HBAC service group entity definitions.
//!
//! Service groups hold any number of individual services and may nest other service groups.
//! Every group carries a description.

use ipa_core::Result;

use crate::registry::ObjectRegistryBuilder;
use crate::schema::{lowercase, AttributeSpec, ObjectTypeConfig, RelationSpec};

/// Type name of HBAC services.
pub const HBAC_SERVICE: &str = "hbacsvc";
/// Type name of HBAC service groups.
pub const HBAC_SERVICE_GROUP: &str = "hbacsvcgroup";

const HBAC_SERVICE_CONTAINER: &str = "cn=hbacservices,cn=hbac";
const HBAC_SERVICE_GROUP_CONTAINER: &str = "cn=hbacservicegroups,cn=hbac";
const UNIQUE_ID_ATTRIBUTE: &str = "ipauniqueid";

/// Individual HBAC service, e.g. `sshd` or `login`.
///
/// # Errors
///
/// Fails only if the static definition is inconsistent.
pub fn hbac_service() -> Result<ObjectTypeConfig> {
    ObjectTypeConfig::builder(HBAC_SERVICE, HBAC_SERVICE_CONTAINER)
        .object_name("HBAC service", "HBAC services")
        .label("HBAC Services")
        .object_classes(&["ipaobject", "ipahbacservice"])
        .unique_id_attribute(UNIQUE_ID_ATTRIBUTE)
        .primary_key(
            AttributeSpec::single("cn")
                .normalizer(lowercase)
                .label("Service name"),
        )
        .attribute(
            AttributeSpec::single("description")
                .label("Description")
                .doc("HBAC service description"),
        )
        .relation(RelationSpec::mirrored(
            "memberof",
            "memberof",
            "member",
            &[HBAC_SERVICE_GROUP],
        ))
        .default_attributes(&["cn", "description", "memberof"])
        .build()
}

/// HBAC service group.
///
/// # Errors
///
/// Fails only if the static definition is inconsistent.
pub fn hbac_service_group() -> Result<ObjectTypeConfig> {
    ObjectTypeConfig::builder(HBAC_SERVICE_GROUP, HBAC_SERVICE_GROUP_CONTAINER)
        .object_name("HBAC service group", "HBAC service groups")
        .label("HBAC Service Groups")
        .object_classes(&["ipaobject", "ipahbacservicegroup"])
        .unique_id_attribute(UNIQUE_ID_ATTRIBUTE)
        .primary_key(
            AttributeSpec::single("cn")
                .normalizer(lowercase)
                .label("Service group name"),
        )
        .attribute(
            AttributeSpec::single("description")
                .required()
                .label("Description")
                .doc("HBAC service group description"),
        )
        .relation(RelationSpec::managed(
            "member",
            "member",
            "memberof",
            &[HBAC_SERVICE, HBAC_SERVICE_GROUP],
        ))
        .relation(RelationSpec::mirrored(
            "memberof",
            "memberof",
            "member",
            &[HBAC_SERVICE_GROUP],
        ))
        .default_attributes(&["cn", "description", "member", "memberof"])
        .build()
}

/// Registers both HBAC types.
///
/// # Errors
///
/// Fails only if a static definition is inconsistent.
pub fn register_hbac(builder: ObjectRegistryBuilder) -> Result<ObjectRegistryBuilder> {
    Ok(builder
        .register(hbac_service()?)
        .register(hbac_service_group()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ObjectRegistry;
    use ipa_core::DistinguishedName;

    #[test]
    fn definitions_register_cleanly() {
        let registry = register_hbac(ObjectRegistry::builder(
            DistinguishedName::parse("dc=example,dc=com").unwrap(),
        ))
        .unwrap()
        .build()
        .unwrap();

        let group = registry.require(HBAC_SERVICE_GROUP).unwrap();
        assert_eq!(
            registry.container_dn(group).as_str(),
            "cn=hbacservicegroups,cn=hbac,dc=example,dc=com"
        );
        assert_eq!(group.primary_key().name(), "cn");
        assert!(group.attribute("description").unwrap().is_required());
        assert!(group.relation("member").unwrap().allows(HBAC_SERVICE));
        assert!(!group.relation("memberof").unwrap().is_managed());

        let service = registry.require(HBAC_SERVICE).unwrap();
        assert!(!service.attribute("description").unwrap().is_required());
        assert_eq!(service.unique_id_attribute(), Some("ipauniqueid"));
    }
}
