use chrono::Utc;
use criterion::{Criterion, criterion_group, criterion_main};
use event_store::{
    AggregateId, AppendOptions, EventStore, EventStoreExt, InMemoryEventStore, NewEvent, Version,
};

fn make_event(aggregate_id: AggregateId) -> NewEvent {
    NewEvent::new(
        aggregate_id,
        "StockUpdated",
        Utc::now(),
        serde_json::json!({
            "type": "StockUpdated",
            "data": { "product_id": aggregate_id.as_i64(), "new_stock": 42 }
        }),
    )
}

fn bench_append_single_event(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("event_store/append_single_event", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryEventStore::new();
                let agg_id = store.allocate_id().await.unwrap();
                store.append_unchecked(make_event(agg_id)).await.unwrap();
            });
        });
    });
}

fn bench_append_with_version_check(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    let agg_id = rt.block_on(store.allocate_id()).unwrap();
    let mut version = Version::initial();

    c.bench_function("event_store/append_with_version_check", |b| {
        b.iter(|| {
            rt.block_on(async {
                store
                    .append(make_event(agg_id), AppendOptions::expect_version(version))
                    .await
                    .unwrap();
            });
            version = version.next();
        });
    });
}

fn bench_load_100_events(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    let agg_id = rt.block_on(async {
        let agg_id = store.allocate_id().await.unwrap();
        for _ in 0..100 {
            store.append_unchecked(make_event(agg_id)).await.unwrap();
        }
        agg_id
    });

    c.bench_function("event_store/load_100_events", |b| {
        b.iter(|| {
            rt.block_on(async {
                let events = store.load(agg_id).await.unwrap();
                assert_eq!(events.len(), 100);
            });
        });
    });
}

criterion_group!(
    benches,
    bench_append_single_event,
    bench_append_with_version_check,
    bench_load_100_events
);
criterion_main!(benches);
