//! Performance benchmarks for the verification hot path.
//!
//! Run with: cargo bench

use std::sync::Arc;

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use agri_seal::crypto::SealSigningKey;
use agri_seal::domain::{integrity_score, Seal, SerialNumber, ShipmentRef, VerifySealRequest};
use agri_seal::infra::{
    InMemoryAuditSink, InMemorySealRepository, InMemoryShipmentDirectory, KeyCustody, MasterKey,
};
use agri_seal::protocol::evaluate;
use agri_seal::service::SealService;

fn provisioned_seal(key: &SealSigningKey) -> Seal {
    Seal::provisioned(
        SerialNumber::parse("SEAL-0001").unwrap(),
        key.public_key_bytes(),
        vec![],
        None,
        Utc::now(),
    )
}

/// Benchmark signature check + counter rule on an unsealed key
fn bench_evaluate(c: &mut Criterion) {
    let key = SealSigningKey::generate();
    let seal = provisioned_seal(&key);
    let signature = key.sign_challenge(seal.challenge.as_bytes());

    c.bench_function("protocol_evaluate", |b| {
        b.iter(|| black_box(evaluate(black_box(&seal), black_box(&signature), 1, &key)));
    });
}

/// Benchmark master-key decryption of a seal private key
fn bench_unseal(c: &mut Criterion) {
    let custody = KeyCustody::new(MasterKey::ephemeral());
    let key = SealSigningKey::generate();
    let mut seal = provisioned_seal(&key);
    seal.encrypted_private_key = custody
        .seal_private_key(&seal.serial_number, &key)
        .unwrap();

    c.bench_function("key_custody_unseal", |b| {
        b.iter(|| black_box(custody.unseal(black_box(&seal)).unwrap()));
    });
}

/// Benchmark the full service path against in-memory storage
fn bench_verify_seal(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let custody = KeyCustody::new(MasterKey::ephemeral());
    let service = SealService::new(
        Arc::new(InMemorySealRepository::new()),
        Arc::new(InMemoryShipmentDirectory::with_shipments(["SHP-42"])),
        Arc::new(InMemoryAuditSink::new()),
        custody.clone(),
    );

    let (seal_id, key, serial) = runtime.block_on(async {
        let provisioned = service.provision_seal("SEAL-0001", None).await.unwrap();
        let seal = service
            .attach_seal(provisioned.seal.id, ShipmentRef::new("SHP-42"), "bench", None)
            .await
            .unwrap();
        (seal.id, custody.unseal(&seal).unwrap(), seal.serial_number)
    });

    let mut counter = 0u64;
    c.bench_function("service_verify_seal", |b| {
        b.to_async(&runtime).iter(|| {
            counter += 1;
            let service = &service;
            let key = &key;
            let serial = serial.clone();
            let claimed = counter;
            async move {
                let seal = service.get_seal(seal_id).await.unwrap();
                let signature = key.sign_challenge(seal.challenge.as_bytes());
                let request = VerifySealRequest::new(serial, signature, claimed, "bench");
                black_box(service.verify_seal(request).await.unwrap())
            }
        });
    });
}

/// Benchmark score computation over growing histories
fn bench_integrity_score(c: &mut Criterion) {
    let mut group = c.benchmark_group("integrity_score");
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let custody = KeyCustody::new(MasterKey::ephemeral());
    let service = SealService::new(
        Arc::new(InMemorySealRepository::new()),
        Arc::new(InMemoryShipmentDirectory::with_shipments(["SHP-42"])),
        Arc::new(InMemoryAuditSink::new()),
        custody.clone(),
    );

    for count in [10u64, 100, 1000] {
        let serial = format!("SEAL-{count:04}");
        let (seal, history) = runtime.block_on(async {
            let provisioned = service.provision_seal(&serial, None).await.unwrap();
            let mut seal = service
                .attach_seal(provisioned.seal.id, ShipmentRef::new("SHP-42"), "bench", None)
                .await
                .unwrap();
            let key = custody.unseal(&seal).unwrap();
            for claimed in 1..=count {
                let signature = key.sign_challenge(seal.challenge.as_bytes());
                let request =
                    VerifySealRequest::new(seal.serial_number.clone(), signature, claimed, "bench");
                seal = service.verify_seal(request).await.unwrap().seal;
            }
            let history = service.get_verification_history(seal.id).await.unwrap();
            (seal, history)
        });

        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::new("history", count), &history, |b, history| {
            b.iter(|| black_box(integrity_score(&seal, history)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_evaluate,
    bench_unseal,
    bench_verify_seal,
    bench_integrity_score
);

criterion_main!(benches);
