//! Integration tests for paired member/memberof maintenance.

mod common;

use common::{engine_config, group_dn, service_dn, setup, setup_with};
use ipa_core::{Entry, Error};
use ipa_objects::hbac::{HBAC_SERVICE, HBAC_SERVICE_GROUP};
use ipa_objects::{members, MemberRef};
use std::time::Duration;

#[tokio::test]
async fn test_add_members_is_symmetric() {
    let harness = setup();
    harness.create_group("login").await;
    harness.create_service("sshd").await;
    harness.create_service("login").await;
    let groups = harness.directory.object(HBAC_SERVICE_GROUP).unwrap();

    let result = groups
        .add_member("LOGIN", "member", &members([("hbacsvc", &["SSHD", "login"][..])]))
        .await
        .unwrap();
    assert!(result.is_complete());
    assert_eq!(
        result.completed,
        vec![MemberRef::new("hbacsvc", "SSHD"), MemberRef::new("hbacsvc", "login")]
    );
    assert_eq!(result.summary, "Added 2 members to HBAC service group \"login\"");
    assert_eq!(result.object.member_keys("member", "hbacsvc"), ["login", "sshd"]);

    assert_eq!(
        harness.stored(&service_dn("sshd"), "memberof").await,
        vec![group_dn("login").normalized()]
    );
    harness.assert_symmetric().await;

    let service = harness
        .directory
        .object(HBAC_SERVICE)
        .unwrap()
        .show("sshd", false)
        .await
        .unwrap();
    assert_eq!(service.member_keys("memberof", "hbacsvcgroup"), ["login"]);
}

#[tokio::test]
async fn test_batch_independence() {
    let harness = setup();
    harness.create_group("login").await;
    harness.create_service("sshd").await;

    let result = harness
        .directory
        .object(HBAC_SERVICE_GROUP)
        .unwrap()
        .add_member(
            "login",
            "member",
            &members([("hbacsvc", &["sshd", "nonexistent"][..])]),
        )
        .await
        .unwrap();
    assert_eq!(result.completed, vec![MemberRef::new("hbacsvc", "sshd")]);
    assert_eq!(result.failed.len(), 1);
    assert!(matches!(
        result.failure("hbacsvc", "nonexistent"),
        Some(Error::NotFound(_))
    ));
    assert_eq!(result.summary, "Added 1 member to HBAC service group \"login\"");
    assert_eq!(
        harness.stored(&group_dn("login"), "member").await,
        vec![service_dn("sshd").normalized()]
    );
    harness.assert_symmetric().await;
}

#[tokio::test]
async fn test_cycle_rejected() {
    let harness = setup();
    harness.create_group("a").await;
    harness.create_group("b").await;
    let groups = harness.directory.object(HBAC_SERVICE_GROUP).unwrap();

    groups
        .add_member("b", "member", &members([("hbacsvcgroup", &["a"][..])]))
        .await
        .unwrap();
    let before = harness.store.snapshot().await;

    let result = groups
        .add_member("a", "member", &members([("hbacsvcgroup", &["b"][..])]))
        .await
        .unwrap();
    assert!(result.completed.is_empty());
    assert!(matches!(
        result.failure("hbacsvcgroup", "b"),
        Some(Error::CycleDetected(_))
    ));
    assert_eq!(harness.store.snapshot().await, before);
}

#[tokio::test]
async fn test_transitive_cycle_and_self_membership() {
    let harness = setup();
    for name in ["a", "b", "c"] {
        harness.create_group(name).await;
    }
    let groups = harness.directory.object(HBAC_SERVICE_GROUP).unwrap();
    groups
        .add_member("a", "member", &members([("hbacsvcgroup", &["b"][..])]))
        .await
        .unwrap();
    groups
        .add_member("b", "member", &members([("hbacsvcgroup", &["c"][..])]))
        .await
        .unwrap();

    let result = groups
        .add_member("c", "member", &members([("hbacsvcgroup", &["a", "c"][..])]))
        .await
        .unwrap();
    assert!(result.completed.is_empty());
    assert!(matches!(
        result.failure("hbacsvcgroup", "a"),
        Some(Error::CycleDetected(_))
    ));
    assert!(matches!(
        result.failure("hbacsvcgroup", "c"),
        Some(Error::CycleDetected(_))
    ));
    assert!(harness.stored(&group_dn("c"), "member").await.is_empty());
    harness.assert_symmetric().await;
}

#[tokio::test]
async fn test_nesting_depth_is_bounded() {
    let harness = setup_with(engine_config().with_max_nesting_depth(2), None);
    for name in ["a", "b", "c", "z"] {
        harness.create_group(name).await;
    }
    let groups = harness.directory.object(HBAC_SERVICE_GROUP).unwrap();
    groups
        .add_member("b", "member", &members([("hbacsvcgroup", &["c"][..])]))
        .await
        .unwrap();
    groups
        .add_member("a", "member", &members([("hbacsvcgroup", &["b"][..])]))
        .await
        .unwrap();

    let result = groups
        .add_member("z", "member", &members([("hbacsvcgroup", &["a"][..])]))
        .await
        .unwrap();
    assert!(matches!(
        result.failure("hbacsvcgroup", "a"),
        Some(Error::CycleDetected(msg)) if msg.contains("exceeds")
    ));
}

#[tokio::test]
async fn test_duplicate_and_absent_members() {
    let harness = setup();
    harness.create_group("login").await;
    harness.create_service("sshd").await;
    harness.create_service("ftp").await;
    let groups = harness.directory.object(HBAC_SERVICE_GROUP).unwrap();
    let sshd = members([("hbacsvc", &["sshd"][..])]);

    groups.add_member("login", "member", &sshd).await.unwrap();
    let again = groups.add_member("login", "member", &sshd).await.unwrap();
    assert!(matches!(
        again.failure("hbacsvc", "sshd"),
        Some(Error::AlreadyMember(_))
    ));

    let removed = groups
        .remove_member(
            "login",
            "member",
            &members([("hbacsvc", &["ftp", "missing"][..])]),
        )
        .await
        .unwrap();
    assert!(removed.completed.is_empty());
    assert!(matches!(removed.failure("hbacsvc", "ftp"), Some(Error::NotMember(_))));
    assert!(matches!(
        removed.failure("hbacsvc", "missing"),
        Some(Error::NotFound(_))
    ));
    harness.assert_symmetric().await;
}

#[tokio::test]
async fn test_unsupported_member_type_is_per_member() {
    let harness = setup();
    harness.create_group("login").await;
    harness.create_service("sshd").await;

    let result = harness
        .directory
        .object(HBAC_SERVICE_GROUP)
        .unwrap()
        .add_member(
            "login",
            "member",
            &members([("host", &["web"][..]), ("hbacsvc", &["sshd"][..])]),
        )
        .await
        .unwrap();
    assert_eq!(result.completed, vec![MemberRef::new("hbacsvc", "sshd")]);
    assert_eq!(
        result.failure("host", "web"),
        Some(&Error::UnsupportedMemberType {
            relation: "member".into(),
            member_type: "host".into(),
        })
    );
}

#[tokio::test]
async fn test_invalid_relation_and_missing_container_abort() {
    let harness = setup();
    harness.create_group("login").await;
    harness.create_service("sshd").await;
    let groups = harness.directory.object(HBAC_SERVICE_GROUP).unwrap();
    let sshd = members([("hbacsvc", &["sshd"][..])]);

    let unknown = groups.add_member("login", "owner", &sshd).await.unwrap_err();
    assert!(unknown.is_validation());

    let read_only = groups
        .add_member("login", "memberof", &members([("hbacsvcgroup", &["login"][..])]))
        .await
        .unwrap_err();
    assert!(read_only.is_validation());

    let service_side = harness
        .directory
        .object(HBAC_SERVICE)
        .unwrap()
        .remove_member("sshd", "memberof", &members([("hbacsvcgroup", &["login"][..])]))
        .await
        .unwrap_err();
    assert!(service_side.is_validation());

    let missing = groups.add_member("nope", "member", &sshd).await.unwrap_err();
    assert_eq!(missing, Error::NotFound("HBAC service group \"nope\" not found".into()));
    assert!(harness.stored(&service_dn("sshd"), "memberof").await.is_empty());
}

#[tokio::test]
async fn test_remove_members_is_symmetric() {
    let harness = setup();
    harness.create_group("login").await;
    harness.create_group("remote").await;
    harness.create_service("sshd").await;
    let groups = harness.directory.object(HBAC_SERVICE_GROUP).unwrap();
    let requested = members([("hbacsvc", &["sshd"][..]), ("hbacsvcgroup", &["remote"][..])]);

    groups.add_member("login", "member", &requested).await.unwrap();
    let shown = groups.show("login", false).await.unwrap();
    assert_eq!(shown.member_keys("member", "hbacsvcgroup"), ["remote"]);
    let remote = groups.show("remote", false).await.unwrap();
    assert_eq!(remote.member_keys("memberof", "hbacsvcgroup"), ["login"]);

    let result = groups
        .remove_member("login", "member", &requested)
        .await
        .unwrap();
    assert_eq!(result.completed.len(), 2);
    assert_eq!(result.summary, "Removed 2 members from HBAC service group \"login\"");
    assert!(result.object.members("member").is_empty());
    assert!(harness.stored(&service_dn("sshd"), "memberof").await.is_empty());
    assert!(harness.stored(&group_dn("remote"), "memberof").await.is_empty());
    harness.assert_symmetric().await;
}

#[tokio::test]
async fn test_remove_reference_to_vanished_member() {
    let harness = setup();
    harness.create_group("login").await;
    let mut entry: Entry = harness.store.snapshot().await.remove(0);
    entry.add_values("member", vec![service_dn("ghost").to_string()]);
    harness.store.insert_raw(entry).await;

    let result = harness
        .directory
        .object(HBAC_SERVICE_GROUP)
        .unwrap()
        .remove_member("login", "member", &members([("hbacsvc", &["ghost"][..])]))
        .await
        .unwrap();
    assert_eq!(result.completed, vec![MemberRef::new("hbacsvc", "ghost")]);
    assert!(harness.stored(&group_dn("login"), "member").await.is_empty());
}

#[tokio::test]
async fn test_failed_reverse_write_is_compensated() {
    let harness = setup();
    harness.create_group("login").await;
    harness.create_service("sshd").await;
    harness.create_service("ftp").await;
    harness.backend.fail_modify(
        &service_dn("sshd"),
        0,
        1,
        Error::BackendUnavailable("replica down".into()),
    );

    let result = harness
        .directory
        .object(HBAC_SERVICE_GROUP)
        .unwrap()
        .add_member("login", "member", &members([("hbacsvc", &["sshd", "ftp"][..])]))
        .await
        .unwrap();
    assert_eq!(result.completed, vec![MemberRef::new("hbacsvc", "ftp")]);
    let error = result.failure("hbacsvc", "sshd").unwrap();
    assert!(error.is_retryable());
    assert_eq!(
        harness.stored(&group_dn("login"), "member").await,
        vec![service_dn("ftp").normalized()]
    );
    harness.assert_symmetric().await;
}

#[tokio::test]
async fn test_failed_read_back_keeps_completed_members() {
    let harness = setup();
    harness.create_group("login").await;
    harness.create_service("sshd").await;
    harness.backend.fail_reads_after_write(&group_dn("login"));

    let result = harness
        .directory
        .object(HBAC_SERVICE_GROUP)
        .unwrap()
        .add_member("login", "member", &members([("hbacsvc", &["sshd"][..])]))
        .await
        .unwrap();
    assert!(result.is_complete());
    assert_eq!(result.completed, vec![MemberRef::new("hbacsvc", "sshd")]);
    assert_eq!(result.summary, "Added 1 member to HBAC service group \"login\"");
    // The container view predates the batch.
    assert!(result.object.member_keys("member", "hbacsvc").is_empty());
    assert_eq!(
        harness.stored(&group_dn("login"), "member").await,
        vec![service_dn("sshd").normalized()]
    );
    harness.assert_symmetric().await;
}

#[tokio::test]
async fn test_failed_compensation_is_reported() {
    let harness = setup();
    harness.create_group("login").await;
    harness.create_service("sshd").await;
    let unavailable = Error::BackendUnavailable("replica down".into());
    harness
        .backend
        .fail_modify(&service_dn("sshd"), 0, 1, unavailable.clone());
    // Let the forward write through, then fail its retraction.
    harness
        .backend
        .fail_modify(&group_dn("login"), 1, 1, unavailable);

    let result = harness
        .directory
        .object(HBAC_SERVICE_GROUP)
        .unwrap()
        .add_member("login", "member", &members([("hbacsvc", &["sshd"][..])]))
        .await
        .unwrap();
    assert!(matches!(
        result.failure("hbacsvc", "sshd"),
        Some(Error::InconsistentMembership(_))
    ));
    assert!(result.object.has_member("member", &service_dn("sshd")));
    assert!(harness.stored(&service_dn("sshd"), "memberof").await.is_empty());
}

#[tokio::test]
async fn test_failed_reverse_removal_restores_forward_edge() {
    let harness = setup();
    harness.create_group("login").await;
    harness.create_service("sshd").await;
    let groups = harness.directory.object(HBAC_SERVICE_GROUP).unwrap();
    let sshd = members([("hbacsvc", &["sshd"][..])]);
    groups.add_member("login", "member", &sshd).await.unwrap();

    harness.backend.fail_modify(
        &service_dn("sshd"),
        0,
        1,
        Error::Timeout("slow replica".into()),
    );
    let result = groups.remove_member("login", "member", &sshd).await.unwrap();
    assert!(matches!(
        result.failure("hbacsvc", "sshd"),
        Some(Error::Timeout(_))
    ));
    assert!(result.object.has_member("member", &service_dn("sshd")));
    harness.assert_symmetric().await;
}

#[tokio::test(start_paused = true)]
async fn test_batch_deadline_stops_remaining_members() {
    let harness = setup_with(
        engine_config().with_batch_timeout_secs(15),
        Some(Duration::from_secs(5)),
    );
    harness.create_group("login").await;
    for name in ["a", "b", "c"] {
        harness.create_service(name).await;
    }

    let result = harness
        .directory
        .object(HBAC_SERVICE_GROUP)
        .unwrap()
        .add_member("login", "member", &members([("hbacsvc", &["a", "b", "c"][..])]))
        .await
        .unwrap();
    assert_eq!(result.completed, vec![MemberRef::new("hbacsvc", "a")]);
    for key in ["b", "c"] {
        let error = result.failure("hbacsvc", key).unwrap();
        assert!(matches!(error, Error::Timeout(_)));
    }
    assert_eq!(
        harness.stored(&group_dn("login"), "member").await,
        vec![service_dn("a").normalized()]
    );
    harness.assert_symmetric().await;
}
