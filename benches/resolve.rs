use criterion::{Criterion, black_box, criterion_group, criterion_main};
use nbdb_ops::model::Model;
use nbdb_ops::model::acl::{Acl, AclAction, AclDirection, build_acl};
use nbdb_ops::{Database, MemoryDatabase, ModelClient, Operation, OperationModel};
use std::collections::BTreeMap;
use tokio::runtime::Runtime;

const SEEDED_RULES: i64 = 2_000;
const BATCH: i64 = 64;

fn rule(priority: i64) -> Acl {
    build_acl(
        &format!("rule-{priority}"),
        AclDirection::ToLport,
        priority,
        &format!("ip4.dst == 10.0.{}.{}", priority / 256, priority % 256),
        AclAction::AllowRelated,
        "",
        None,
        false,
        BTreeMap::new(),
        BTreeMap::new(),
    )
}

fn seeded_db(rt: &Runtime) -> MemoryDatabase {
    let db = MemoryDatabase::northbound();
    let ops: Vec<Operation> = (0..SEEDED_RULES)
        .map(|i| Operation::Insert {
            table: Acl::TABLE.to_string(),
            uuid_name: format!("useed{i}"),
            row: rule(i).to_row(),
        })
        .collect();
    rt.block_on(db.transact(ops)).expect("seed");
    db
}

fn bench_resolve(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let db = seeded_db(&rt);
    let client = ModelClient::new(&db);

    c.bench_function("create_or_update_converged_batch", |b| {
        b.iter(|| {
            let mut acls: Vec<Acl> = (0..BATCH).map(rule).collect();
            let mut models: Vec<_> = acls.iter_mut().map(OperationModel::new).collect();
            let ops = client
                .create_or_update_ops(Vec::new(), &mut models)
                .expect("ops");
            black_box(ops);
        })
    });

    c.bench_function("create_or_update_new_batch", |b| {
        b.iter(|| {
            let mut acls: Vec<Acl> = (SEEDED_RULES..SEEDED_RULES + BATCH).map(rule).collect();
            let mut models: Vec<_> = acls.iter_mut().map(OperationModel::new).collect();
            let ops = client
                .create_or_update_ops(Vec::new(), &mut models)
                .expect("ops");
            black_box(ops);
        })
    });
}

criterion_group!(benches, bench_resolve);
criterion_main!(benches);
