use super::test_db;
use crate::types::{DigestInterval, GroupId, PreferenceOverride, UserId};

#[tokio::test]
async fn test_user_prefs_round_trip() {
    let (db, _tmp) = test_db().await;
    let user = UserId(1);

    assert!(db.load_user_prefs(user).await.unwrap().is_none());

    let prefs = PreferenceOverride {
        interval: Some(DigestInterval::DAILY),
        send_even_if_active: Some(true),
    };
    db.set_user_prefs(user, prefs).await.unwrap();
    assert_eq!(db.load_user_prefs(user).await.unwrap(), Some(prefs));

    db.clear_user_prefs(user).await.unwrap();
    assert!(db.load_user_prefs(user).await.unwrap().is_none());

    db.close().await;
}

#[tokio::test]
async fn test_partial_override_keeps_inherit_as_none() {
    let (db, _tmp) = test_db().await;
    let user = UserId(1);

    // Only the interval is overridden; send_even_if_active still inherits
    db.set_user_prefs(
        user,
        PreferenceOverride {
            interval: Some(DigestInterval::Minutes(60)),
            send_even_if_active: None,
        },
    )
    .await
    .unwrap();

    let loaded = db.load_user_prefs(user).await.unwrap().unwrap();
    assert_eq!(loaded.interval, Some(DigestInterval::Minutes(60)));
    assert!(loaded.send_even_if_active.is_none());

    db.close().await;
}

#[tokio::test]
async fn test_do_not_send_sentinel_round_trips() {
    let (db, _tmp) = test_db().await;
    let group = GroupId(7);

    db.set_group_prefs(
        group,
        PreferenceOverride {
            interval: Some(DigestInterval::DoNotSend),
            send_even_if_active: None,
        },
    )
    .await
    .unwrap();

    let loaded = db.load_group_prefs(group).await.unwrap().unwrap();
    // Stored as the 0 sentinel, not as NULL (which would mean inherit)
    assert_eq!(loaded.interval, Some(DigestInterval::DoNotSend));

    db.close().await;
}

#[tokio::test]
async fn test_preference_chain_ordering() {
    let (db, _tmp) = test_db().await;
    let user = UserId(1);
    let staff = GroupId(10);
    let mods = GroupId(20);

    db.set_user_prefs(
        user,
        PreferenceOverride {
            interval: None,
            send_even_if_active: Some(true),
        },
    )
    .await
    .unwrap();

    db.set_group_prefs(
        staff,
        PreferenceOverride {
            interval: Some(DigestInterval::WEEKLY),
            send_even_if_active: None,
        },
    )
    .await
    .unwrap();
    db.set_group_prefs(
        mods,
        PreferenceOverride {
            interval: Some(DigestInterval::DAILY),
            send_even_if_active: Some(false),
        },
    )
    .await
    .unwrap();
    db.set_group_prefs(
        GroupId::EVERYONE,
        PreferenceOverride {
            interval: Some(DigestInterval::DoNotSend),
            send_even_if_active: Some(false),
        },
    )
    .await
    .unwrap();

    // mods is walked before staff because of its lower position
    db.add_group_member(mods, user, 0).await.unwrap();
    db.add_group_member(staff, user, 1).await.unwrap();

    let chain = db.load_preference_chain(user).await.unwrap();
    assert_eq!(chain.len(), 4);
    assert_eq!(chain[0].send_even_if_active, Some(true)); // user layer
    assert_eq!(chain[1].interval, Some(DigestInterval::DAILY)); // mods
    assert_eq!(chain[2].interval, Some(DigestInterval::WEEKLY)); // staff
    assert_eq!(chain[3].interval, Some(DigestInterval::DoNotSend)); // Everyone

    db.close().await;
}

#[tokio::test]
async fn test_everyone_layer_needs_no_membership_row() {
    let (db, _tmp) = test_db().await;
    let user = UserId(1);

    db.set_group_prefs(
        GroupId::EVERYONE,
        PreferenceOverride {
            interval: Some(DigestInterval::DAILY),
            send_even_if_active: None,
        },
    )
    .await
    .unwrap();

    let chain = db.load_preference_chain(user).await.unwrap();
    assert_eq!(chain.len(), 1);
    assert_eq!(chain[0].interval, Some(DigestInterval::DAILY));

    db.close().await;
}

#[tokio::test]
async fn test_removed_member_drops_out_of_chain() {
    let (db, _tmp) = test_db().await;
    let user = UserId(1);
    let group = GroupId(5);

    db.set_group_prefs(
        group,
        PreferenceOverride {
            interval: Some(DigestInterval::DAILY),
            send_even_if_active: None,
        },
    )
    .await
    .unwrap();
    db.add_group_member(group, user, 0).await.unwrap();
    assert_eq!(db.load_preference_chain(user).await.unwrap().len(), 1);

    db.remove_group_member(group, user).await.unwrap();
    assert!(db.load_preference_chain(user).await.unwrap().is_empty());

    db.close().await;
}
