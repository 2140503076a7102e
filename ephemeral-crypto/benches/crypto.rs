use criterion::*;
use ed25519_dalek::SigningKey;
use ephemeral_crypto::{operation_encryptor, participant_auth, temporal_key, time_locked_encryption};
use ephemeral_types::{OperationId, ParticipantId, WorkspaceId, operation::CRDTOperation, time::TimeWindow};
use rand_core::OsRng;

fn temporal_key_bench(c: &mut Criterion) {
    let window = TimeWindow::new(0, 30 * 60_000, 5, 10_000).expect("valid window");

    c.bench_function("temporal_key/derive", |b| {
        b.iter(|| temporal_key::derive_temporal_key(black_box(b"root secret"), black_box(b"workspace-1"), &window, 1))
    });
}

fn operation_bench(c: &mut Criterion) {
    let window = TimeWindow::new(0, 30 * 60_000, 5, 10_000).expect("valid window");
    let key = temporal_key::derive_temporal_key(b"root secret", b"workspace-1", &window, 0).expect("valid rotation");
    let signing_key = SigningKey::generate(&mut OsRng);
    let workspace_id = WorkspaceId::new_random();

    c.bench_function("operation_encryptor/encrypt", |b| {
        b.iter_batched(
            || CRDTOperation::insert(OperationId::new_random(), ParticipantId::new_random(), 0, 0, "hello".to_string()),
            |op| operation_encryptor::encrypt_operation(&op, workspace_id, &key, &signing_key),
            BatchSize::SmallInput,
        )
    });

    c.bench_function("operation_encryptor/decrypt", |b| {
        let op = CRDTOperation::insert(OperationId::new_random(), ParticipantId::new_random(), 0, 0, "hello".to_string());
        let encrypted = operation_encryptor::encrypt_operation(&op, workspace_id, &key, &signing_key).expect("seals");
        let public_key = signing_key.verifying_key().to_bytes();
        b.iter(|| operation_encryptor::decrypt_operation(black_box(&encrypted), &public_key, &key))
    });
}

fn aead_bench(c: &mut Criterion) {
    let window = TimeWindow::new(0, 30 * 60_000, 5, 10_000).expect("valid window");
    let key = temporal_key::derive_temporal_key(b"root secret", b"workspace-1", &window, 0).expect("valid rotation");
    let plaintext = vec![0u8; 256];

    c.bench_function("time_locked_encryption/seal_256b", |b| {
        b.iter(|| time_locked_encryption::seal(&key, black_box(b"aad"), black_box(&plaintext)))
    });
}

fn participant_auth_bench(c: &mut Criterion) {
    let signing_key = SigningKey::generate(&mut OsRng);
    let participant_id = ParticipantId::new_random();
    let challenge = participant_auth::generate_challenge();

    c.bench_function("participant_auth/generate_and_verify", |b| {
        b.iter(|| {
            let proof = participant_auth::generate_proof(&signing_key, participant_id, &challenge, 0);
            participant_auth::verify_proof(signing_key.verifying_key().as_bytes(), participant_id, &challenge, &proof, 0)
        })
    });
}

criterion_group!(benches, temporal_key_bench, operation_bench, aead_bench, participant_auth_bench);
criterion_main!(benches);
