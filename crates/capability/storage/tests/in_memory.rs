use domain::{LinkStatus, StatusUpdate};
use tgw_storage::{AllowListStore, InMemoryAllowListStore, InMemoryStatusStore, StatusStore};

#[tokio::test]
async fn allow_list_membership_and_rebuild() {
    let store = InMemoryAllowListStore::with_imeis(["3332210"]);
    assert!(store.is_authorised("3332210").await.expect("lookup"));
    assert!(!store.is_authorised("999").await.expect("lookup"));

    store
        .replace_all(&["357689078699600".to_string()])
        .await
        .expect("rebuild");
    assert!(!store.is_authorised("3332210").await.expect("lookup"));
    assert!(store
        .is_authorised("357689078699600")
        .await
        .expect("lookup"));
}

#[tokio::test]
async fn status_merges_field_wise() {
    let store = InMemoryStatusStore::new();
    store
        .upsert_status(&StatusUpdate {
            imei: "3332210".to_string(),
            status: Some(LinkStatus::Connected),
            lat: Some(14.9),
            lon: Some(5.2),
            speed_kmh: Some(40.0),
            course_deg: Some(10.0),
            acc: Some(true),
            satellites: Some(9),
            updated_at_ms: 1_000,
        })
        .await
        .expect("first upsert");

    // 心跳只带链路状态，不得清掉定位字段
    store
        .upsert_status(&StatusUpdate::link("3332210", LinkStatus::Connected, 2_000))
        .await
        .expect("heartbeat upsert");

    let record = store
        .get_status("3332210")
        .await
        .expect("get")
        .expect("present");
    assert_eq!(record.lat, Some(14.9));
    assert_eq!(record.acc, Some(true));
    assert_eq!(record.updated_at_ms, 2_000);

    store
        .upsert_status(&StatusUpdate::link(
            "3332210",
            LinkStatus::Disconnected,
            3_000,
        ))
        .await
        .expect("disconnect upsert");
    let record = store
        .get_status("3332210")
        .await
        .expect("get")
        .expect("present");
    assert_eq!(record.status, Some(LinkStatus::Disconnected));
    assert_eq!(record.lon, Some(5.2));

    assert_eq!(store.list_statuses().await.expect("list").len(), 1);
}

#[tokio::test]
async fn status_missing_imei_is_none() {
    let store = InMemoryStatusStore::new();
    assert!(store.get_status("404").await.expect("get").is_none());
}
