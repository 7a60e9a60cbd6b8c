use std::collections::HashSet;

use chrono::NaiveDate;
use futures_util::future::join_all;
use ledger_engine::{
    helpers::{FiscalYear, SequenceScope},
    test_utils::prepare_env::fresh_database,
    LedgerDatabase,
    SequenceApi,
    SqliteDatabase,
};
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};
use tokio::runtime::Runtime;

async fn tear_down(mut db: SqliteDatabase) {
    if let Err(e) = db.close().await {
        error!("🚀️ Failed to close database: {e}");
    }
    Sqlite::drop_database(db.url()).await.unwrap();
}

#[test]
fn first_allocation_is_the_scope_default() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async move {
        let db = fresh_database(2).await;
        let api = SequenceApi::new(db.clone());
        assert_eq!(api.current_sequence_value(&SequenceScope::Invoice).await.unwrap(), None);
        assert_eq!(api.allocate_sequential_id(&SequenceScope::Invoice).await.unwrap(), "INV-0001");
        assert_eq!(api.allocate_sequential_id(&SequenceScope::Invoice).await.unwrap(), "INV-0002");
        assert_eq!(api.allocate_sequential_id(&SequenceScope::Subscription).await.unwrap(), "SGSER0001");
        assert_eq!(api.allocate_sequential_id(&SequenceScope::Subscriber).await.unwrap(), "SG0001");
        let fy = FiscalYear::containing(NaiveDate::from_ymd_opt(2025, 11, 3).unwrap());
        assert_eq!(api.allocate_sequential_id(&SequenceScope::TaxInvoice(fy)).await.unwrap(), "SGTPL/25-26/0001");
        let custom = SequenceScope::Custom { key: "credit_note".into(), prefix: "CN-".into(), width: 6 };
        assert_eq!(api.allocate_sequential_id(&custom).await.unwrap(), "CN-000001");
        assert_eq!(api.current_sequence_value(&SequenceScope::Invoice).await.unwrap(), Some(2));
        tear_down(db).await;
    });
}

#[test]
fn seeding_continues_from_legacy_ids() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async move {
        let db = fresh_database(2).await;
        let api = SequenceApi::new(db.clone());
        assert_eq!(api.seed_sequence(&SequenceScope::Subscription, "SGSER0412").await.unwrap(), 412);
        assert_eq!(api.allocate_sequential_id(&SequenceScope::Subscription).await.unwrap(), "SGSER0413");
        // Counters never move backwards
        assert_eq!(api.seed_sequence(&SequenceScope::Subscription, "SGSER0100").await.unwrap(), 413);
        assert_eq!(api.allocate_sequential_id(&SequenceScope::Subscription).await.unwrap(), "SGSER0414");
        // Unparseable ids leave the scope at its default
        assert_eq!(api.seed_sequence(&SequenceScope::Invoice, "INV-ABC").await.unwrap(), 0);
        assert_eq!(api.allocate_sequential_id(&SequenceScope::Invoice).await.unwrap(), "INV-0001");
        // Numbers wider than the padding are not truncated
        api.seed_sequence(&SequenceScope::Subscriber, "SG9999").await.unwrap();
        assert_eq!(api.allocate_sequential_id(&SequenceScope::Subscriber).await.unwrap(), "SG10000");
        tear_down(db).await;
    });
}

#[test]
fn concurrent_allocations_never_collide() {
    const TASKS: usize = 8;
    const PER_TASK: usize = 25;
    let rt = Runtime::new().unwrap();
    rt.block_on(async move {
        let db = fresh_database(5).await;
        let handles = (0..TASKS).map(|_| {
            let api = SequenceApi::new(db.clone());
            tokio::spawn(async move {
                let mut ids = Vec::with_capacity(PER_TASK);
                for _ in 0..PER_TASK {
                    ids.push(api.allocate_sequential_id(&SequenceScope::Invoice).await.expect("Allocation failed"));
                }
                ids
            })
        });
        let ids = join_all(handles).await.into_iter().flat_map(|r| r.expect("Task panicked")).collect::<Vec<_>>();
        let unique = ids.iter().collect::<HashSet<_>>();
        assert_eq!(ids.len(), TASKS * PER_TASK);
        assert_eq!(unique.len(), ids.len(), "Duplicate identifiers were handed out");
        let api = SequenceApi::new(db.clone());
        let last = api.current_sequence_value(&SequenceScope::Invoice).await.unwrap();
        assert_eq!(last, Some((TASKS * PER_TASK) as i64));
        tear_down(db).await;
    });
}
