use std::time::Duration;

use futures::StreamExt;
use serde_json::json;

use super::*;

async fn next_result(stream: &mut ResultStream) -> Result<ResultSet, LiveQueryError> {
    tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("live query emission")
        .expect("stream open")
}

fn waiting_query() -> Query {
    Query::new()
        .eq("status", "Waiting")
        .ne("amountRemaining", 0)
        .sort_ascending("createdAt")
}

#[tokio::test]
async fn emits_initial_result_then_re_emits_on_every_mutation() {
    let store = InMemoryLiveQuery::new();
    store
        .upsert(
            "donations",
            json!({"_id": "a", "status": "Waiting", "amountRemaining": "3", "createdAt": "2018-01-02T00:00:00Z"}),
        )
        .await;

    let mut stream = store.watch("donations", waiting_query()).await.expect("watch");
    assert_eq!(next_result(&mut stream).await.expect("initial").len(), 1);

    store
        .upsert(
            "donations",
            json!({"_id": "b", "status": "Waiting", "amountRemaining": "2", "createdAt": "2018-01-01T00:00:00Z"}),
        )
        .await;
    let added = next_result(&mut stream).await.expect("after insert");
    assert_eq!(added.data[0]["_id"], json!("b"));
    assert_eq!(added.len(), 2);

    assert!(store.patch("donations", "a", json!({"amountRemaining": "0"})).await);
    let updated = next_result(&mut stream).await.expect("after patch");
    assert_eq!(updated.len(), 1);

    assert!(store.remove("donations", "b").await);
    assert!(next_result(&mut stream).await.expect("after remove").is_empty());
}

#[tokio::test]
async fn ignores_mutations_of_other_collections() {
    let store = InMemoryLiveQuery::new();
    let mut stream = store.watch("donations", waiting_query()).await.expect("watch");
    assert!(next_result(&mut stream).await.expect("initial").is_empty());

    store.upsert("dacs", json!({"_id": "dac"})).await;
    let pending = tokio::time::timeout(Duration::from_millis(100), stream.next()).await;
    assert!(pending.is_err(), "unrelated mutation must not re-emit");
}

#[tokio::test]
async fn upsert_replaces_documents_with_the_same_id() {
    let store = InMemoryLiveQuery::new();
    store.upsert("dacs", json!({"_id": "dac", "title": "old"})).await;
    store.upsert("dacs", json!({"_id": "dac", "title": "new"})).await;

    let documents = store.documents("dacs").await;
    assert_eq!(documents, vec![json!({"_id": "dac", "title": "new"})]);
}

#[tokio::test]
async fn failing_watchers_yields_an_error_and_ends_the_stream() {
    let store = InMemoryLiveQuery::new();
    let mut stream = store.watch("donations", waiting_query()).await.expect("watch");
    next_result(&mut stream).await.expect("initial");

    store.fail_watchers("donations", "backend went away");
    let err = next_result(&mut stream).await.expect_err("failure");
    assert_eq!(
        err,
        LiveQueryError::Failed {
            collection: "donations".into(),
            reason: "backend went away".into(),
        }
    );
    let end = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("stream end");
    assert!(end.is_none());
}

#[tokio::test]
async fn dropping_the_stream_stops_the_watcher() {
    let store = InMemoryLiveQuery::new();
    let stream = store.watch("donations", waiting_query()).await.expect("watch");
    assert_eq!(store.active_watchers(), 1);

    drop(stream);
    for _ in 0..50 {
        if store.active_watchers() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("watcher still active after unsubscribe");
}

#[tokio::test]
async fn missing_service_reports_unavailable() {
    let err = match MissingLiveQueryService.watch("dacs", Query::new()).await {
        Ok(_) => panic!("missing service must not produce a stream"),
        Err(err) => err,
    };
    assert!(matches!(err, LiveQueryError::Unavailable(_)));
}
