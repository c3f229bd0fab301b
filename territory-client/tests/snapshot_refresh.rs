use std::sync::Arc;
use std::time::Duration;
use territory_client::ledger::ReadQuery;
use territory_client::{
    Address, Amount, ClientConfig, ErrorKind, GameClient, InMemoryLedger, LocationId, RefreshOutcome,
};

fn me() -> Address {
    Address::from_bytes([0x11; 20])
}

async fn connect() -> (Arc<InMemoryLedger>, GameClient) {
    let config = ClientConfig::default().with_player(me());
    let ledger = Arc::new(InMemoryLedger::new(&config));
    let client = GameClient::connect_with(config, ledger.clone()).await.unwrap();
    (ledger, client)
}

#[tokio::test]
async fn test_partial_failure_keeps_values_and_marks_stale() {
    let (ledger, client) = connect().await;
    let target = LocationId::new(2);
    ledger.fail_reads(move |query| matches!(query, ReadQuery::LocationOwner { location } if *location == target));

    let outcome = client.refresh().await;
    assert_eq!(outcome, RefreshOutcome::Applied { version: 2, stale_fields: 1 });

    let snapshot = client.snapshot();
    let view = snapshot.location_view(target).unwrap();
    assert!(view.owner.is_stale());
    assert_eq!(view.owner.get(), Some(None));
    assert!(!view.base_power.is_stale());
    assert!(!snapshot.location_view(LocationId::new(1)).unwrap().is_stale());
    assert!(snapshot.last_error.is_some());
    // stale values still feed previews
    assert!(client.preview_attack(target, 40).unwrap().stale);

    ledger.clear_read_faults();
    client.refresh().await;
    assert!(!client.snapshot().is_stale());
}

#[tokio::test]
async fn test_unreachable_ledger_degrades_to_stale() {
    let (ledger, client) = connect().await;
    ledger.set_offline(true);

    client.refresh().await;
    let snapshot = client.snapshot();
    assert!(snapshot.is_stale());
    assert_eq!(snapshot.location(LocationId::new(1)).unwrap().base_power, 30);
    assert_eq!(
        snapshot.last_error.as_ref().map(|e| e.kind.clone()),
        Some(ErrorKind::NetworkUnreachable)
    );
}

#[tokio::test(start_paused = true)]
async fn test_slow_read_times_out() {
    let (ledger, client) = connect().await;
    ledger.delay_next_read(Duration::from_secs(60));

    client.refresh().await;
    let snapshot = client.snapshot();
    assert_eq!(
        snapshot.last_error.as_ref().map(|e| e.kind.clone()),
        Some(ErrorKind::Timeout)
    );
    assert!(snapshot.is_stale());
}

#[tokio::test(start_paused = true)]
async fn test_older_refresh_cannot_overwrite_newer() {
    let (ledger, client) = connect().await;
    let cache = client.cache().clone();

    ledger.delay_next_read(Duration::from_secs(2));
    let slow = tokio::spawn({
        let cache = cache.clone();
        async move { cache.refresh().await }
    });
    tokio::task::yield_now().await;

    ledger.mint_gold(me(), Amount::from_units(7));
    let fast = cache.invalidate_now().await;
    assert_eq!(fast, RefreshOutcome::Applied { version: 2, stale_fields: 0 });

    assert_eq!(slow.await.unwrap(), RefreshOutcome::Superseded);
    let snapshot = client.snapshot();
    assert_eq!(snapshot.version, 2);
    assert_eq!(snapshot.wallet_gold.get(), Some(Amount::from_units(7)));
}

#[tokio::test(start_paused = true)]
async fn test_polling_publishes_versions() {
    let (ledger, client) = connect().await;
    let mut updates = client.watch();
    let polling = client.start_polling();

    ledger.mint_gold(me(), Amount::from_units(3));
    updates
        .wait_for(|s| s.wallet_gold.get() == Some(Amount::from_units(3)))
        .await
        .unwrap();
    assert!(polling.is_running());

    polling.stop().await;
    let version = client.snapshot().version;
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(client.snapshot().version, version);
}
