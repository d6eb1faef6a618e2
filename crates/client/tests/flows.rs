//! Operation flow tests against the in-process simulator.
//!
//! These cover:
//! - Symmetric round trips per cipher and mode, padding, chunking
//! - The EncryptDecrypt fallback
//! - Interruptible hashing equivalence
//! - Signature acceptance and rejection
//! - Capability paging
//! - Independent sessions on separate threads

use std::thread;

use tpm_client::flows::{
    self, capability, pkcs7_pad, HashSequence, SigningKey, SymmetricKey,
};
use tpm_client::{ClientError, Template, Tpm};
use tpm_protocol::types::Signature;
use tpm_protocol::{AlgorithmId, CommandCode, EccCurve, EccParameter, Hierarchy, ResponseCode};
use tpm_simulator::{Simulator, SimulatorChannel, SimulatorConfig};

fn tpm() -> Tpm<SimulatorChannel> {
    Tpm::new(SimulatorChannel::default())
}

fn iv_for(cipher: AlgorithmId) -> Vec<u8> {
    vec![0x42; cipher.block_size().unwrap()]
}

// =============================================================================
// Symmetric Round Trips
// =============================================================================

#[test]
fn test_round_trip_all_gost_ciphers_and_modes() {
    let tpm = tpm();
    for cipher in [AlgorithmId::Magma, AlgorithmId::Grasshopper] {
        let block = cipher.block_size().unwrap();
        for mode in [AlgorithmId::Cbc, AlgorithmId::Ctr] {
            let plaintext: Vec<u8> = (0..(block * 4) as u8).collect();
            let result = flows::round_trip(&tpm, cipher, mode, &iv_for(cipher), &plaintext).unwrap();
            assert_eq!(result.recovered, plaintext, "{cipher}/{mode}");
            assert_ne!(result.ciphertext, plaintext, "{cipher}/{mode}");
            assert_eq!(result.ciphertext.len(), plaintext.len());
        }
    }
}

#[test]
fn test_ctr_accepts_unaligned_input() {
    let tpm = tpm();
    for cipher in [AlgorithmId::Magma, AlgorithmId::Grasshopper] {
        let plaintext = b"thirteen byte";
        let result =
            flows::round_trip(&tpm, cipher, AlgorithmId::Ctr, &iv_for(cipher), plaintext).unwrap();
        assert_eq!(result.recovered, plaintext);
        assert_eq!(result.ciphertext.len(), plaintext.len());
    }
}

#[test]
fn test_cbc_rejects_unaligned_input() {
    let tpm = tpm();
    for cipher in [AlgorithmId::Magma, AlgorithmId::Grasshopper] {
        let err = flows::round_trip(&tpm, cipher, AlgorithmId::Cbc, &iv_for(cipher), b"odd")
            .unwrap_err();
        assert!(err.is_code(ResponseCode::SIZE), "{cipher}: {err}");
    }
}

#[test]
fn test_padded_variants_per_mode() {
    let tpm = tpm();
    let primary = tpm
        .create_primary(Hierarchy::Owner, &Template::storage(AlgorithmId::Grasshopper).unwrap())
        .unwrap();
    let plaintext = b"not a multiple of the block";

    let cbc_blob = tpm
        .create_object(
            &primary,
            &Template::symmetric(AlgorithmId::Magma, AlgorithmId::Cbc).unwrap(),
        )
        .unwrap();
    let cbc = SymmetricKey::load(&tpm, &primary, &cbc_blob).unwrap();
    let iv = iv_for(AlgorithmId::Magma);
    let ciphertext = cbc.encrypt_padded(&iv, plaintext).unwrap();
    assert_eq!(ciphertext.len(), pkcs7_pad(plaintext, 8).len());
    assert_eq!(cbc.decrypt_padded(&iv, &ciphertext).unwrap(), plaintext);
    cbc.release().unwrap();

    let ctr_blob = tpm
        .create_object(
            &primary,
            &Template::symmetric(AlgorithmId::Magma, AlgorithmId::Ctr).unwrap(),
        )
        .unwrap();
    let ctr = SymmetricKey::load(&tpm, &primary, &ctr_blob).unwrap();
    let ciphertext = ctr.encrypt_padded(&iv, plaintext).unwrap();
    // Stream modes are never padded
    assert_eq!(ciphertext.len(), plaintext.len());
    assert_eq!(ctr.decrypt_padded(&iv, &ciphertext).unwrap(), plaintext);
}

#[test]
fn test_large_input_chains_iv() {
    let tpm = tpm();
    let primary = tpm
        .create_primary(Hierarchy::Owner, &Template::storage(AlgorithmId::Grasshopper).unwrap())
        .unwrap();
    let blob = tpm
        .create_object(
            &primary,
            &Template::symmetric(AlgorithmId::Grasshopper, AlgorithmId::Cbc).unwrap(),
        )
        .unwrap();
    let key = SymmetricKey::load(&tpm, &primary, &blob).unwrap();

    let plaintext: Vec<u8> = (0..2048u32).map(|i| (i % 251) as u8).collect();
    let iv = iv_for(AlgorithmId::Grasshopper);
    let ciphertext = key.encrypt(&iv, &plaintext).unwrap();
    assert_eq!(key.decrypt(&iv, &ciphertext).unwrap(), plaintext);

    // The second half decrypts on its own with the last block of the first as IV
    let second_iv = &ciphertext[1024 - 16..1024];
    assert_eq!(
        key.decrypt(second_iv, &ciphertext[1024..]).unwrap(),
        &plaintext[1024..]
    );
}

#[test]
fn test_ctr_large_unaligned_input() {
    let tpm = tpm();
    let plaintext = vec![0xA5; 3001];
    let result = flows::round_trip(
        &tpm,
        AlgorithmId::Magma,
        AlgorithmId::Ctr,
        &iv_for(AlgorithmId::Magma),
        &plaintext,
    )
    .unwrap();
    assert_eq!(result.recovered, plaintext);
}

#[test]
fn test_legacy_encrypt_decrypt_fallback() {
    let simulator =
        Simulator::new(SimulatorConfig::default().disable(CommandCode::EncryptDecrypt2));
    let tpm = Tpm::new(SimulatorChannel::new(simulator));

    let result = flows::round_trip(
        &tpm,
        AlgorithmId::Grasshopper,
        AlgorithmId::Ctr,
        &iv_for(AlgorithmId::Grasshopper),
        b"falls back to the legacy command",
    )
    .unwrap();
    assert_eq!(result.recovered, b"falls back to the legacy command");
}

#[test]
fn test_aes_still_supported() {
    let tpm = tpm();
    let result = flows::round_trip(&tpm, AlgorithmId::Aes, AlgorithmId::Cbc, &[1; 16], &[2; 32])
        .unwrap();
    assert_eq!(result.recovered, vec![2; 32]);
}

// =============================================================================
// Hashing
// =============================================================================

#[test]
fn test_hash_chunking_is_equivalent() {
    let tpm = tpm();
    let data: Vec<u8> = (0..48u8).map(|b| b.wrapping_mul(7)).collect();

    for algorithm in [AlgorithmId::Gost3411_256, AlgorithmId::Gost3411_512, AlgorithmId::Sha256] {
        let one_shot = flows::hash(&tpm, algorithm, &data).unwrap();
        let eight_by_six = flows::hash_chunked(&tpm, algorithm, &data, 6).unwrap();
        let one_by_48 = flows::hash_chunked(&tpm, algorithm, &data, 48).unwrap();
        assert_eq!(eight_by_six, one_shot, "{algorithm}");
        assert_eq!(one_by_48, one_shot, "{algorithm}");
    }
}

#[test]
fn test_uneven_pieces_match() {
    let tpm = tpm();
    let data = vec![0x11; 3000];
    let pieces: [&[u8]; 4] = [&data[..1], &data[1..1500], &data[1500..2999], &data[2999..]];

    let streamed = flows::hash_interruptible(&tpm, AlgorithmId::Gost3411_256, pieces).unwrap();
    let mut sequence = HashSequence::start(&tpm, AlgorithmId::Gost3411_256).unwrap();
    sequence.update(&data).unwrap();
    assert_eq!(sequence.complete(&[]).unwrap(), streamed);
}

#[test]
fn test_suspended_sequence_holds_no_slot() {
    let simulator = Simulator::new(SimulatorConfig::default().with_max_objects(1));
    let tpm = Tpm::new(SimulatorChannel::new(simulator));

    let mut sequence = HashSequence::start(&tpm, AlgorithmId::Gost3411_512).unwrap();
    sequence.update(b"first half ").unwrap();
    let suspended = sequence.suspend().unwrap();

    // The only slot is free for other work meanwhile
    let primary = tpm
        .create_primary(Hierarchy::Owner, &Template::storage(AlgorithmId::Magma).unwrap())
        .unwrap();
    primary.release().unwrap();

    let mut sequence = suspended.resume(&tpm).unwrap();
    sequence.update(b"second half").unwrap();
    let digest = sequence.complete(&[]).unwrap();
    assert_eq!(
        digest,
        flows::hash(&tpm, AlgorithmId::Gost3411_512, b"first half second half").unwrap()
    );
}

#[test]
fn test_oversized_one_shot_rejected() {
    let tpm = tpm();
    let err = flows::hash(&tpm, AlgorithmId::Gost3411_256, &[0; 1025]).unwrap_err();
    assert!(matches!(err, ClientError::InputTooLarge { .. }));
}

// =============================================================================
// Signatures
// =============================================================================

#[test]
fn test_sign_and_verify_every_gost_curve() {
    let tpm = tpm();
    for curve in [
        EccCurve::Gost256A,
        EccCurve::Gost256B,
        EccCurve::Gost256C,
        EccCurve::Gost256D,
        EccCurve::Gost512A,
        EccCurve::Gost512B,
        EccCurve::Gost512C,
    ] {
        let digest = vec![0x3C; curve.coordinate_size()];
        assert!(flows::sign_and_verify(&tpm, curve, &digest).is_ok(), "{curve:?}");
    }
}

#[test]
fn test_verify_rejects_altered_inputs() {
    let tpm = tpm();
    let primary = tpm
        .create_primary(Hierarchy::Owner, &Template::storage(AlgorithmId::Grasshopper).unwrap())
        .unwrap();
    let blob = tpm
        .create_object(&primary, &Template::gost_signing(EccCurve::Gost256B).unwrap())
        .unwrap();
    let key = SigningKey::load(&tpm, &primary, &blob).unwrap();
    assert_eq!(key.scheme(), AlgorithmId::Gost3410_256);
    assert_eq!(key.hash(), AlgorithmId::Gost3411_256);

    let digest = flows::hash(&tpm, key.hash(), b"signed message").unwrap();
    let signature = key.sign(digest.as_bytes()).unwrap();
    assert!(key.is_valid(digest.as_bytes(), &signature).unwrap());

    // One flipped digest bit
    let mut flipped = digest.as_bytes().to_vec();
    flipped[0] ^= 0x80;
    assert!(!key.is_valid(&flipped, &signature).unwrap());
    let err = key.verify(&flipped, &signature).unwrap_err();
    assert!(err.is_code(ResponseCode::SIGNATURE));

    // Truncated signature
    let Signature::Ecc { scheme, hash, r, s } = signature.clone() else {
        panic!("expected an ECC signature");
    };
    let short = Signature::Ecc {
        scheme,
        hash,
        r,
        s: EccParameter::new(s.as_bytes()[..s.len() - 1].to_vec()).unwrap(),
    };
    assert!(!key.is_valid(digest.as_bytes(), &short).unwrap());
}

#[test]
fn test_signature_bound_to_key() {
    let tpm = tpm();
    let primary = tpm
        .create_primary(Hierarchy::Owner, &Template::storage(AlgorithmId::Grasshopper).unwrap())
        .unwrap();
    let template = Template::gost_signing(EccCurve::Gost512A).unwrap();
    let first = SigningKey::load(&tpm, &primary, &tpm.create_object(&primary, &template).unwrap())
        .unwrap();
    let second = SigningKey::load(&tpm, &primary, &tpm.create_object(&primary, &template).unwrap())
        .unwrap();

    let digest = [0x77; 64];
    let signature = first.sign(&digest).unwrap();
    assert!(first.is_valid(&digest, &signature).unwrap());
    assert!(!second.is_valid(&digest, &signature).unwrap());
}

// =============================================================================
// Capabilities
// =============================================================================

#[test]
fn test_capability_paging() {
    let tpm = tpm();
    let all = capability::algorithms(&tpm, 0, 1000).unwrap();
    assert!(all.len() > 4);

    let first = capability::algorithms(&tpm, 0, 3).unwrap();
    assert_eq!(first, all[..3]);
    let next = capability::algorithms(&tpm, first[2].id + 1, 3).unwrap();
    assert_eq!(next, all[3..6.min(all.len())]);

    let last = all.last().unwrap().id;
    assert!(capability::algorithms(&tpm, last + 1, 10).unwrap().is_empty());
}

#[test]
fn test_every_gost_algorithm_advertised() {
    let tpm = tpm();
    for algorithm in [
        AlgorithmId::Gost3411_256,
        AlgorithmId::Gost3411_512,
        AlgorithmId::Magma,
        AlgorithmId::Grasshopper,
        AlgorithmId::Gost3410_256,
        AlgorithmId::Gost3410_512,
    ] {
        assert!(capability::has_algorithm(&tpm, algorithm).unwrap(), "{algorithm}");
    }
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_independent_sessions_on_threads() {
    let workers: Vec<_> = (0..4u8)
        .map(|n| {
            thread::spawn(move || {
                let tpm = tpm();
                let data = vec![n; 200];
                let digest = flows::hash_chunked(&tpm, AlgorithmId::Gost3411_256, &data, 16)?;
                let result = flows::round_trip(
                    &tpm,
                    AlgorithmId::Magma,
                    AlgorithmId::Ctr,
                    &[n; 8],
                    &data,
                )?;
                assert_eq!(result.recovered, data);
                Ok::<_, ClientError>(digest)
            })
        })
        .collect();

    let digests: Vec<_> = workers
        .into_iter()
        .map(|worker| worker.join().unwrap().unwrap())
        .collect();
    let tpm = tpm();
    for (n, digest) in digests.iter().enumerate() {
        let expected = flows::hash(&tpm, AlgorithmId::Gost3411_256, &vec![n as u8; 200]).unwrap();
        assert_eq!(digest, &expected);
    }
}

#[test]
fn test_one_session_shared_across_threads() {
    let tpm = Tpm::new(SimulatorChannel::new(Simulator::new(
        SimulatorConfig::default().with_max_objects(8),
    )));
    thread::scope(|scope| {
        for n in 0..4u8 {
            let tpm = &tpm;
            scope.spawn(move || {
                let random = capability::get_random(tpm, 32).unwrap();
                assert_eq!(random.len(), 32);
                let digest = flows::hash(tpm, AlgorithmId::Gost3411_512, &[n; 10]).unwrap();
                assert_eq!(digest.len(), 64);
            });
        }
    });
    assert!(!tpm.is_failed());
}
