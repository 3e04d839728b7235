use chrono::Utc;
use common::{ConnectionId, TransactionId};
use criterion::{Criterion, criterion_group, criterion_main};
use store::{InMemoryTransactionStore, InvoiceTransaction, TransactionStatus, TransactionStore};

fn make_record(id: TransactionId) -> InvoiceTransaction {
    InvoiceTransaction::generated(
        id,
        ConnectionId::from("bench-conn"),
        "ws://localhost:3000/ws",
        300,
        120,
    )
}

fn bench_create(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("store/create", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryTransactionStore::new();
                store
                    .create(make_record(TransactionId::generate()))
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_success_path_transitions(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("store/compare_and_set_success_path", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryTransactionStore::new();
                let id = TransactionId::generate();
                store.create(make_record(id.clone())).await.unwrap();
                store
                    .compare_and_set(&id, TransactionStatus::Generated, TransactionStatus::Received)
                    .await
                    .unwrap();
                store
                    .compare_and_set(&id, TransactionStatus::Received, TransactionStatus::Processed)
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_purge_expired_1000(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("store/purge_expired_1000", |b| {
        b.iter(|| {
            rt.block_on(async {
                let store = InMemoryTransactionStore::new();
                let past = Utc::now().timestamp() - 1;
                for _ in 0..1000 {
                    store
                        .create(make_record(TransactionId::generate()).with_ttl(past))
                        .await
                        .unwrap();
                }
                let removed = store.purge_expired(Utc::now()).await.unwrap();
                assert_eq!(removed.len(), 1000);
            });
        });
    });
}

criterion_group!(
    benches,
    bench_create,
    bench_success_path_transitions,
    bench_purge_expired_1000
);
criterion_main!(benches);
