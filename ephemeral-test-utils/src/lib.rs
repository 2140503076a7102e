//! Shared fixtures for the integration test suites that drive a whole
//! [`Engine`] in-process: keypairs, a deterministic clock offset helper, and
//! an in-memory engine builder.

use std::net::SocketAddr;

use ed25519_dalek::SigningKey;
use ephemeral_service::Engine;
use ephemeral_service::config::{Environment, EngineConfig};
use ephemeral_types::ParticipantId;
use rand_core::OsRng;
use tokio_util::sync::CancellationToken;
use x25519_dalek::{PublicKey, StaticSecret};

/// A participant's full keypair set (Ed25519 for signing/auth, X25519 for
/// the metadata envelope), plus a freshly generated id.
pub struct ParticipantKeys {
    /// The participant's identifier.
    pub id: ParticipantId,
    /// Ed25519 signing key, used for handshake proofs and operation signing.
    pub signing_key: SigningKey,
    /// X25519 static secret, used to decrypt the workspace metadata envelope.
    pub x25519_secret: StaticSecret,
}

impl ParticipantKeys {
    /// Generates a fresh keypair set with a random participant id.
    pub fn generate() -> Self {
        Self {
            id: ParticipantId::new_random(),
            signing_key: SigningKey::generate(&mut OsRng),
            x25519_secret: StaticSecret::random_from_rng(OsRng),
        }
    }

    /// The Ed25519 public key, as sent in a handshake.
    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// The X25519 public key, as sent in a handshake.
    pub fn x25519_public_key(&self) -> [u8; 32] {
        PublicKey::from(&self.x25519_secret).to_bytes()
    }
}

/// Builds an [`EngineConfig`] with short, test-friendly defaults: a wide-open
/// participant cap and generous rate limits so tests don't trip them
/// incidentally, parsed the same way the real binary parses its arguments.
pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::parse_from(["ephemeral-service-test"]);
    config.environment = Environment::Dev;
    config.bind_addr = "127.0.0.1:0".parse::<SocketAddr>().expect("valid socket addr");
    config
}

/// Constructs a fresh in-memory [`Engine`] wired with [`test_config`], and
/// the [`CancellationToken`] that owns its background tasks. Callers should
/// cancel the token when the test is done to stop the sweep task promptly.
pub fn test_engine() -> (std::sync::Arc<Engine>, CancellationToken) {
    let shutdown = CancellationToken::new();
    let engine = Engine::new(test_config(), shutdown.clone());
    (engine, shutdown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_round_trip_through_verification() {
        let keys = ParticipantKeys::generate();
        let challenge = ephemeral_crypto::participant_auth::generate_challenge();
        let proof = ephemeral_crypto::participant_auth::generate_proof(&keys.signing_key, keys.id, &challenge, 1_000);
        let public_key = keys.public_key();
        assert!(ephemeral_crypto::participant_auth::verify_proof(&public_key, keys.id, &challenge, &proof, 1_000).is_ok());
    }

    #[test]
    fn test_engine_builds_a_router() {
        let (engine, shutdown) = test_engine();
        let _router = engine.router();
        shutdown.cancel();
    }
}
