mod common;

use common::{context, raw_insert, rule};
use nbdb_ops::catalog::types::{Datum, Row};
use nbdb_ops::catalog::{ACL_TABLE, LOGICAL_SWITCH_TABLE};
use nbdb_ops::model::logical_switch::LogicalSwitch;
use nbdb_ops::{
    MemoryDatabase, Operation, OpsConfig, OpsError, OpsErrorCode, Transactor, TransportError,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rejected_operation_rolls_back_the_batch() {
    let db = Arc::new(MemoryDatabase::northbound());
    let ctx = context(&db, OpsConfig::default());
    let ops = vec![
        raw_insert("ua", &rule("a", 1, "ip4")),
        Operation::Update {
            table: ACL_TABLE.into(),
            uuid: "ua".into(),
            row: Row::new().with("no_such_column", Datum::Bool(true)),
        },
        raw_insert("ub", &rule("b", 2, "ip4")),
    ];

    let err = ctx.transactor().transact(ops).expect_err("rejected");
    match &err {
        OpsError::ServerRejected { index, error, .. } => {
            assert_eq!(*index, 1);
            assert_eq!(error, "constraint violation");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!err.is_retryable());
    assert_eq!(db.row_count(ACL_TABLE), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_server_times_out_as_retryable_transport_error() {
    let db = Arc::new(MemoryDatabase::northbound());
    let config = OpsConfig::default().with_txn_timeout(Duration::from_millis(20));
    let ctx = context(&db, config);
    db.set_latency(Duration::from_millis(500));

    let err = ctx
        .transactor()
        .transact(vec![raw_insert("ua", &rule("a", 1, "ip4"))])
        .expect_err("timeout");
    assert_eq!(err.code(), OpsErrorCode::Timeout);
    assert!(err.is_retryable());
    assert_eq!(db.row_count(ACL_TABLE), 0);

    db.set_latency(Duration::ZERO);
    ctx.transactor()
        .transact(vec![raw_insert("ua", &rule("a", 1, "ip4"))])
        .expect("retry");
    assert_eq!(db.row_count(ACL_TABLE), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn expired_deadline_never_reaches_the_server() {
    let db = Arc::new(MemoryDatabase::northbound());
    let ctx = context(&db, OpsConfig::default());
    let mut switches = vec![LogicalSwitch {
        uuid: "usw1".into(),
        ..LogicalSwitch::named("sw1")
    }];

    let err = ctx
        .commit_with_deadline(
            vec![raw_insert("usw1", &switches[0])],
            &mut switches,
            Instant::now(),
        )
        .expect_err("expired");
    assert!(matches!(
        err,
        OpsError::Transport(TransportError::Timeout(d)) if d.is_zero()
    ));
    assert_eq!(db.transact_calls(), 0);
    assert_eq!(switches[0].uuid, "usw1");

    let deadline = Instant::now() + Duration::from_secs(5);
    let results = ctx
        .commit_with_deadline(vec![raw_insert("usw1", &switches[0])], &mut switches, deadline)
        .expect("within deadline");
    assert_eq!(db.transact_calls(), 1);
    assert_eq!(Some(&switches[0].uuid), results[0].uuid.as_ref());
    assert!(db.server_row(LOGICAL_SWITCH_TABLE, &switches[0].uuid).is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unrepresentable_timeout_still_commits() {
    let db = Arc::new(MemoryDatabase::northbound());
    let transactor = Transactor::new(Arc::clone(&db), Handle::current(), Duration::MAX);
    transactor
        .transact(vec![raw_insert("ua", &rule("a", 1, "ip4"))])
        .expect("commit");
    assert_eq!(db.row_count(ACL_TABLE), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disconnected_server_is_retryable() {
    let db = Arc::new(MemoryDatabase::northbound());
    let ctx = context(&db, OpsConfig::default());
    db.fail_next_transact(TransportError::NotConnected);

    let err = ctx
        .transactor()
        .transact(vec![raw_insert("ua", &rule("a", 1, "ip4"))])
        .expect_err("down");
    assert_eq!(err.code(), OpsErrorCode::NotConnected);
    assert!(err.is_retryable());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_batch_is_not_sent() {
    let db = Arc::new(MemoryDatabase::northbound());
    let ctx = context(&db, OpsConfig::default());
    let results = ctx.transactor().transact(Vec::new()).expect("empty");
    assert!(results.is_empty());
    assert_eq!(db.transact_calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn inserted_records_receive_server_identifiers() {
    let db = Arc::new(MemoryDatabase::northbound());
    let ctx = context(&db, OpsConfig::default());
    let mut switches = vec![
        LogicalSwitch {
            uuid: "usw1".into(),
            ..LogicalSwitch::named("sw1")
        },
        LogicalSwitch {
            uuid: "usw2".into(),
            ..LogicalSwitch::named("sw2")
        },
    ];
    let acl = rule("a", 1, "ip4");
    let ops = vec![
        raw_insert("uacl", &acl),
        raw_insert(
            "usw1",
            &LogicalSwitch {
                acls: BTreeSet::from(["uacl".to_string()]),
                ..switches[0].clone()
            },
        ),
        raw_insert("usw2", &switches[1]),
    ];

    let results = ctx.commit(ops, &mut switches).expect("commit");
    assert_eq!(switches[0].uuid, results[1].uuid.clone().expect("uuid"));
    assert_eq!(switches[1].uuid, results[2].uuid.clone().expect("uuid"));
    assert!(db.server_row(LOGICAL_SWITCH_TABLE, &switches[0].uuid).is_some());
}

#[test]
fn invalid_config_is_rejected_at_construction() {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .expect("runtime");
    let db = Arc::new(MemoryDatabase::northbound());
    let config = OpsConfig {
        txn_timeout_ms: 0,
        ..OpsConfig::default()
    };
    let err = nbdb_ops::OpsContext::new(db, rt.handle().clone(), config)
        .err()
        .expect("invalid");
    assert_eq!(err.code(), OpsErrorCode::InvalidConfig);
}

#[test]
fn current_thread_handle_is_rejected_at_construction() {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");
    let db = Arc::new(MemoryDatabase::northbound());
    let err = nbdb_ops::OpsContext::new(db, rt.handle().clone(), OpsConfig::default())
        .err()
        .expect("invalid");
    assert_eq!(err.code(), OpsErrorCode::InvalidConfig);
}

#[tokio::test]
async fn transacting_from_a_current_thread_runtime_fails_without_panicking() {
    let pool = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .expect("runtime");
    let db = Arc::new(MemoryDatabase::northbound());
    let transactor = Transactor::new(Arc::clone(&db), pool.handle().clone(), Duration::from_secs(1));

    let err = transactor
        .transact(vec![raw_insert("ua", &rule("a", 1, "ip4"))])
        .expect_err("unsupported");
    assert_eq!(err.code(), OpsErrorCode::UnsupportedRuntime);
    assert!(!err.is_retryable());
    assert_eq!(db.transact_calls(), 0);
    pool.shutdown_background();
}
