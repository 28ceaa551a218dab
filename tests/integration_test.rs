use quillseal::authorship;
use quillseal::chain::{EpochChain, GENESIS_HASH};
use quillseal::delta::insert_group;
use quillseal::envelope;
use quillseal::keys::KeyMaterial;
use quillseal::storage;
use quillseal::vdf::VdfComputer;
use quillseal::verify::Verifier;
use serde_json::json;
use tempfile::TempDir;

/// Seals `epochs` real epochs with short delays.
fn sealed_chain(computer: &VdfComputer, texts: &[&str], iterations: u64) -> EpochChain {
    let mut chain = EpochChain::new();
    for text in texts {
        let tip_hash = chain.tip().hash.clone();
        let proof = computer
            .compute_proof::<fn(u8)>(&tip_hash, iterations, None)
            .expect("compute proof");
        chain
            .append(vec![insert_group(text)], &proof, iterations, 0.5)
            .expect("append epoch");
    }
    chain
}

fn signed_envelope(chain: &EpochChain, keys: &KeyMaterial) -> envelope::Envelope {
    let built = envelope::build(
        "Field Notes",
        "<p>Field notes</p>",
        json!({ "ops": [{ "insert": "Field notes" }] }),
        chain,
    )
    .expect("build envelope");
    envelope::sign(built, keys.signing_key()).expect("sign envelope")
}

#[test]
fn s1_vdf_determinism_and_tamper() {
    let computer = VdfComputer::new();

    let first = computer
        .compute_proof::<fn(u8)>("abc", 1024, None)
        .expect("first run");
    let second = computer
        .compute_proof::<fn(u8)>("abc", 1024, None)
        .expect("second run");
    assert_eq!(first, second, "VDF must be fully deterministic");
    assert!(computer.verify_proof("abc", &first));

    let mut tampered = first;
    let mut y = tampered.y.into_bytes();
    let last = y.last_mut().expect("non-empty y");
    *last = if *last == b'0' { b'1' } else { b'0' };
    tampered.y = String::from_utf8(y).expect("hex");
    assert!(!computer.verify_proof("abc", &tampered));
}

#[test]
fn s2_tampered_deltas_break_the_next_link() {
    let computer = VdfComputer::new();
    let chain = sealed_chain(&computer, &["a", "b", "c"], 64);
    let verifier = Verifier::new(VdfComputer::new());

    let clean = verifier.verify_chain(chain.epochs());
    assert!(clean.valid, "untouched chain must verify: {:?}", clean.errors);
    assert_eq!(clean.verified_epochs, 3);

    // Replace epoch 2's deltas and re-hash it, as a forger would.
    let mut epochs = chain.epochs().to_vec();
    epochs[2].deltas = vec![insert_group("X")];
    let proof = epochs[2].vdf_proof.clone().expect("proof");
    epochs[2].hash = quillseal::chain::epoch_hash(
        epochs[2].epoch_number,
        epochs[2].previous_hash.as_deref().expect("previous"),
        &epochs[2].deltas,
        &proof.y,
        epochs[2].iterations,
    )
    .expect("re-hash");

    let report = verifier.verify_chain(&epochs);
    assert!(!report.valid);
    assert_eq!(report.errors, vec!["Epoch 3: Broken chain.".to_string()]);
    assert_eq!(report.verified_epochs, 2);
}

#[test]
fn s3_signature_binds_the_title() {
    let computer = VdfComputer::new();
    let chain = sealed_chain(&computer, &["draft"], 64);
    let keys = KeyMaterial::generate();
    let verifier = Verifier::new(VdfComputer::new());

    let signed = signed_envelope(&chain, &keys);
    assert!(verifier.verify(&signed).valid);

    let mut tampered = signed.clone();
    tampered.title = "Someone Else's Notes".to_string();
    let report = verifier.verify(&tampered);
    assert!(!report.valid);
    assert!(!report.signature_valid);

    tampered.title = signed.title.clone();
    let restored = verifier.verify(&tampered);
    assert!(restored.valid, "restored envelope: {:?}", restored.errors);
    assert!(restored.signature_valid);
}

#[test]
fn s4_calibration_adjustment() {
    assert_eq!(EpochChain::adjust_iterations(20.0, 10.0, 100_000), 75_000);
    assert_eq!(EpochChain::adjust_iterations(10.1, 10.0, 100_000), 100_000);
}

#[test]
fn s5_large_paste_short_circuit() {
    let epoch = quillseal::Epoch {
        epoch_number: 1,
        previous_hash: Some(GENESIS_HASH.to_string()),
        deltas: vec![insert_group(&"x".repeat(150))],
        vdf_proof: None,
        iterations: 1000,
        epoch_duration: 10.0,
        timestamp: "2026-01-01T00:00:00.000Z".to_string(),
        hash: GENESIS_HASH.to_string(),
    };
    let report = authorship::analyze(&[quillseal::Epoch::genesis(), epoch]);
    assert!((report.human_score - 0.10).abs() < 1e-9);
    assert_eq!(
        report.details.anomaly_reason.as_deref(),
        Some("Large paste detected.")
    );
}

#[test]
fn s6_verifier_reports_all_failures_in_order() {
    let computer = VdfComputer::new();
    let chain = sealed_chain(&computer, &["one", "two", "three", "four", "five"], 64);
    let verifier = Verifier::new(VdfComputer::new());

    let mut epochs = chain.epochs().to_vec();
    // Epoch 3: deltas changed without re-hashing -> hash mismatch only.
    epochs[3].deltas = vec![insert_group("forged")];
    // Epoch 4: pi is outside the epoch hash, so corrupting it breaks only
    // the proof relation.
    epochs[4].vdf_proof.as_mut().expect("proof").pi = "deadbeef".to_string();

    let report = verifier.verify_chain(&epochs);
    assert!(!report.valid);
    assert_eq!(
        report.errors,
        vec![
            "Epoch 3: Hash mismatch.".to_string(),
            "Epoch 4: Invalid VDF proof.".to_string(),
        ]
    );
    assert_eq!(report.verified_epochs, 3);
    assert_eq!(report.total_epochs, 5);
}

#[test]
fn vdf_round_trip_law_including_zero() {
    let computer = VdfComputer::new();
    for t in [0u64, 1, 10, 1000, 100_000] {
        let proof = computer
            .compute_proof::<fn(u8)>("round-trip-law", t, None)
            .expect("compute");
        assert!(computer.verify_proof("round-trip-law", &proof), "T={t}");
    }

    let zero = computer
        .compute_proof::<fn(u8)>("zero-case", 0, None)
        .expect("compute");
    assert_eq!(zero.pi, "1");
    assert_eq!(zero.l, "3");
    assert_eq!(zero.r, "1");
    assert_eq!(
        zero.y,
        computer
            .compute_proof::<fn(u8)>("zero-case", 0, None)
            .expect("recompute")
            .y
    );
}

#[test]
fn envelope_round_trip_preserves_document_hash() {
    let computer = VdfComputer::new();
    let chain = sealed_chain(&computer, &["stable"], 64);
    let keys = KeyMaterial::generate();
    let signed = signed_envelope(&chain, &keys);

    let json = serde_json::to_string(&signed).expect("serialize");
    let reparsed: envelope::Envelope = serde_json::from_str(&json).expect("parse");

    assert_eq!(
        envelope::document_hash(&reparsed).expect("recompute"),
        signed.metadata.document_hash.clone().expect("stored")
    );
    assert!(envelope::verify_signature(&reparsed));
}

#[test]
fn envelope_metadata_matches_chain_endpoints() {
    let computer = VdfComputer::new();
    let chain = sealed_chain(&computer, &["a", "b"], 64);
    let keys = KeyMaterial::generate();
    let signed = signed_envelope(&chain, &keys);

    assert_eq!(signed.metadata.epoch_count, signed.proof_chain.len());
    assert_eq!(signed.metadata.genesis_hash, signed.proof_chain[0].hash);
    assert_eq!(
        signed.metadata.latest_hash,
        signed.proof_chain.last().expect("tip").hash
    );
    let total: f64 = signed.proof_chain.iter().map(|e| e.epoch_duration).sum();
    assert!((signed.metadata.total_duration - total).abs() < 1e-9);
    assert_eq!(
        signed.metadata.signature.as_ref().expect("signature").len(),
        envelope::SIGNATURE_LEN
    );
}

#[test]
fn sealed_save_load_keeps_chain_verifiable() {
    let computer = VdfComputer::new();
    let chain = sealed_chain(&computer, &["persisted"], 64);
    let keys = KeyMaterial::generate();
    let signed = signed_envelope(&chain, &keys);
    let key = keys.document_key();

    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("notes.qsd");
    storage::save(&storage::seal(&signed, &key).expect("seal"), &path).expect("save");

    let reloaded = storage::open(&storage::load(&path).expect("load"), &key).expect("open");
    assert_eq!(reloaded, signed);

    let verifier = Verifier::new(VdfComputer::new());
    let report = verifier.verify(&reloaded);
    assert!(report.valid, "reloaded envelope: {:?}", report.errors);
}

#[test]
fn version_is_exposed() {
    assert!(!quillseal::version().is_empty());
}
