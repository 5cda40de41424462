use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::Utc;
use onboardflow_core::{
    topics, BusinessKey, Execute, ExternalTask, ProcessInstanceId, TaskId, Variables, WorkerId,
};
use onboardflow_handlers::{
    generate_account_id, HandlerTable, SimulatedAccountBackend, ValidationReport,
};
use onboardflow_workflow::vars;
use std::sync::Arc;
use std::time::Duration;

fn task(topic: &str, variables: Variables) -> ExternalTask {
    ExternalTask {
        id: TaskId::new(),
        topic: topic.to_string(),
        process_instance_id: ProcessInstanceId::new(),
        business_key: Some(BusinessKey::generate()),
        variables,
        retries: None,
        worker_id: WorkerId::new("bench-worker"),
        lock_expiration_time: Utc::now(),
    }
}

fn bench_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("validation_report");

    let inputs = [
        ("valid", "Amit Sharma", "amit@example.com", "PASSPORT"),
        ("all_invalid", "", "not-an-email", "VISA"),
    ];

    for (label, name, email, doc) in inputs {
        group.bench_with_input(BenchmarkId::from_parameter(label), &(name, email, doc), |b, i| {
            b.iter(|| ValidationReport::check(black_box(Some(i.0)), black_box(Some(i.1)), black_box(Some(i.2))));
        });
    }

    group.finish();
}

fn bench_account_ids(c: &mut Criterion) {
    let mut group = c.benchmark_group("account_id");
    group.throughput(Throughput::Elements(1));
    group.bench_function("generate", |b| b.iter(generate_account_id));
    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let table = HandlerTable::onboarding(
        Arc::new(SimulatedAccountBackend::new(Duration::ZERO)),
        Duration::from_secs(1),
    );

    let validate = task(
        topics::VALIDATE_DATA,
        Variables::new()
            .with(vars::CUSTOMER_NAME, "Amit Sharma")
            .with(vars::EMAIL, "amit@example.com")
            .with(vars::DOCUMENT_TYPE, "ID"),
    );
    let handle_error = task(topics::HANDLE_ERROR, Variables::new());

    let mut group = c.benchmark_group("handler_dispatch");
    group.bench_function("validate_data", |b| {
        b.iter(|| rt.block_on(table.execute(black_box(&validate))));
    });
    group.bench_function("handle_error", |b| {
        b.iter(|| rt.block_on(table.execute(black_box(&handle_error))));
    });
    group.finish();
}

criterion_group!(benches, bench_validation, bench_account_ids, bench_dispatch);
criterion_main!(benches);
