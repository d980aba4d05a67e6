//! PKCE and state-nonce generation (RFC 7636).

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
use sha2::{Digest, Sha256};

const VERIFIER_LENGTH: usize = 128;
const STATE_LENGTH: usize = 32;

// Unreserved characters allowed in a code verifier (RFC 7636 §4.1).
const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// A verifier/challenge pair. Single-use: a retried flow generates a fresh
/// pair, never reuses one.
#[derive(Debug)]
pub struct PkceChallenge {
    pub verifier: String,
    pub challenge: String,
}

/// Generate a fresh PKCE pair (S256 challenge method).
pub fn generate_pkce() -> PkceChallenge {
    let verifier = random_string(VERIFIER_LENGTH);
    let challenge = URL_SAFE_NO_PAD.encode(sha256(&verifier));
    PkceChallenge {
        verifier,
        challenge,
    }
}

/// Generate a fresh state nonce for one authorization request.
pub fn generate_state() -> String {
    random_string(STATE_LENGTH)
}

fn random_string(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| {
            let index = rng.gen_range(0..CHARSET.len());
            CHARSET[index] as char
        })
        .collect()
}

fn sha256(data: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    hasher.finalize().to_vec()
}
