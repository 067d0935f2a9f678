// Benchmarks for the SHROUD protocol hot paths.
//
// Covers salted signing and verification, sealing a pseudonym, canonical
// encoding, and the two Authority steps that run per principal: issuance
// and submission acceptance.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use shroud_protocol::messages::{Envelope, ProtocolMessage, PseudonymRequest, Submission};
use shroud_protocol::{Authority, Identity, Participant, Pseudonym, RealId};

fn bench_sign_verify(c: &mut Criterion) {
    let identity = Identity::generate();
    let message = b"pseudonym_request S12345 1700000000000";
    let signature = identity.sign(message);
    let public_key = identity.public_key();

    c.bench_function("identity/sign", |b| b.iter(|| identity.sign(message)));
    c.bench_function("identity/verify", |b| {
        b.iter(|| Identity::verify(message, &signature, &public_key))
    });
}

fn bench_seal(c: &mut Criterion) {
    let sender = Identity::generate();
    let recipient = Identity::generate();
    let pseudonym = Pseudonym::mint();
    let sealed = sender
        .encrypt_for(pseudonym.as_str().as_bytes(), &recipient.public_key())
        .unwrap();

    c.bench_function("identity/encrypt_for", |b| {
        b.iter(|| sender.encrypt_for(pseudonym.as_str().as_bytes(), &recipient.public_key()))
    });
    c.bench_function("identity/decrypt", |b| b.iter(|| recipient.decrypt(&sealed)));
}

fn bench_canonical_bytes(c: &mut Criterion) {
    let mut group = c.benchmark_group("messages/canonical_bytes");
    for size in [64usize, 4 * 1024, 64 * 1024] {
        let submission = Submission::new(Pseudonym::mint(), "x".repeat(size));
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &submission, |b, s| {
            b.iter(|| s.canonical_bytes().unwrap());
        });
    }
    group.finish();
}

fn bench_issuance(c: &mut Criterion) {
    let authority = Authority::generate();
    let student = Identity::generate();

    c.bench_function("authority/request_pseudonym", |b| {
        b.iter(|| {
            let request =
                Envelope::sign(PseudonymRequest::new(RealId::new("S12345")), &student).unwrap();
            authority.request_pseudonym(&request).unwrap()
        });
    });
}

fn bench_submission(c: &mut Criterion) {
    let authority = Authority::generate();
    let mut student = Participant::new("Bench", RealId::new("S1"), authority.public_key());
    student.request_pseudonym(&authority).unwrap();
    let envelope = student.create_submission("a short essay").unwrap();

    c.bench_function("authority/submit_work", |b| {
        b.iter(|| authority.submit_work(&envelope).unwrap());
    });
}

criterion_group!(
    benches,
    bench_sign_verify,
    bench_seal,
    bench_canonical_bytes,
    bench_issuance,
    bench_submission,
);
criterion_main!(benches);
