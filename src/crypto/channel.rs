//! Signed, encrypted delivery of small payloads to the server.
//!
//! Wire format: `{ encryptedData, signature }`, both base64.
//!
//! - `encryptedData` = RSA-OAEP(SHA-256) under the server public key.
//! - `signature` = RSASSA-PKCS1-v1_5(SHA-256) over the exact `encryptedData`
//!   bytes, made with the counterpart private key.
//!
//! Opening verifies the signature strictly before any decryption is attempted.
//! The plaintext ceiling is `k - 66` bytes for a `k`-byte modulus (190 bytes at
//! 2048 bits), so the safe itself never travels this way.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::error::{AuthFailure, CryptoError};
use super::identity::{CounterpartKeys, IdentityKeyPair, ServerIdentity};

/// OAEP overhead for SHA-256: two digests plus two bytes.
const OAEP_SHA256_OVERHEAD: usize = 2 * 32 + 2;

/// An encrypted payload and the signature over it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPayload {
    encrypted_data: Vec<u8>,
    signature: Vec<u8>,
}

/// Base64 wire form of a [`SignedPayload`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedPayload {
    #[serde(default)]
    pub encrypted_data: String,
    #[serde(default)]
    pub signature: String,
}

impl SignedPayload {
    pub fn new(encrypted_data: Vec<u8>, signature: Vec<u8>) -> Self {
        Self {
            encrypted_data,
            signature,
        }
    }

    pub fn encrypted_data(&self) -> &[u8] {
        &self.encrypted_data
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    pub fn encode(&self) -> EncodedPayload {
        EncodedPayload {
            encrypted_data: BASE64.encode(&self.encrypted_data),
            signature: BASE64.encode(&self.signature),
        }
    }

    pub fn decode(encoded: &EncodedPayload) -> Result<Self, CryptoError> {
        if encoded.encrypted_data.trim().is_empty() || encoded.signature.trim().is_empty() {
            return Err(CryptoError::invalid(
                "both encryptedData and signature are required",
            ));
        }
        Ok(Self {
            encrypted_data: BASE64.decode(encoded.encrypted_data.trim())?,
            signature: BASE64.decode(encoded.signature.trim())?,
        })
    }
}

/// Largest plaintext `recipient` can receive in one payload.
pub fn max_plaintext_len(recipient: &RsaPublicKey) -> usize {
    recipient.size().saturating_sub(OAEP_SHA256_OVERHEAD)
}

/// Verify, then decrypt, a payload sent by the registered counterpart.
pub fn open_and_verify<C: CounterpartKeys>(
    identity: &ServerIdentity<C>,
    payload: &SignedPayload,
) -> Result<String, CryptoError> {
    let counterpart = identity.counterpart().ok_or_else(|| {
        CryptoError::PreconditionFailed("no counterpart key registered".to_string())
    })?;

    let signature = Signature::try_from(payload.signature.as_slice())
        .map_err(|_| CryptoError::AuthenticationFailure(AuthFailure::Signature))?;
    VerifyingKey::<Sha256>::new(counterpart)
        .verify(&payload.encrypted_data, &signature)
        .map_err(|_| CryptoError::AuthenticationFailure(AuthFailure::Signature))?;

    let plaintext = identity
        .keypair()
        .private_key()
        .decrypt_blinded(
            &mut rand::thread_rng(),
            Oaep::new::<Sha256>(),
            &payload.encrypted_data,
        )
        .map_err(|_| CryptoError::AuthenticationFailure(AuthFailure::Padding))?;

    let text = String::from_utf8(plaintext)
        .map_err(|_| CryptoError::DecodeError("secure payload is not valid UTF-8".to_string()))?;
    tracing::info!(bytes = text.len(), "Opened secure payload");
    Ok(text)
}

/// Counterpart side: encrypt `plaintext` for `recipient` and sign the result.
pub fn seal_and_sign(
    recipient: &RsaPublicKey,
    sender: &IdentityKeyPair,
    plaintext: &str,
) -> Result<SignedPayload, CryptoError> {
    seal_and_sign_bytes(recipient, sender, plaintext.as_bytes())
}

/// Byte-level variant of [`seal_and_sign`].
pub fn seal_and_sign_bytes(
    recipient: &RsaPublicKey,
    sender: &IdentityKeyPair,
    plaintext: &[u8],
) -> Result<SignedPayload, CryptoError> {
    let limit = max_plaintext_len(recipient);
    if plaintext.len() > limit {
        return Err(CryptoError::invalid(format!(
            "payload is {} bytes, channel limit is {}",
            plaintext.len(),
            limit
        )));
    }

    let encrypted_data = recipient
        .encrypt(&mut rand::thread_rng(), Oaep::new::<Sha256>(), plaintext)
        .map_err(|e| CryptoError::invalid(format!("encryption failed: {}", e)))?;
    let signature = SigningKey::<Sha256>::new(sender.private_key().clone()).sign(&encrypted_data);

    Ok(SignedPayload {
        encrypted_data,
        signature: signature.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::test_keys::{client_keys, other_client_keys, server_keys};

    fn identity_with_client() -> ServerIdentity {
        let identity = ServerIdentity::new(server_keys().clone());
        identity
            .register_counterpart(&client_keys().export_public().unwrap())
            .unwrap();
        identity
    }

    #[test]
    fn hello_roundtrip() {
        let identity = identity_with_client();
        let payload = seal_and_sign(server_keys().public_key(), client_keys(), "hello").unwrap();
        assert_eq!(open_and_verify(&identity, &payload).unwrap(), "hello");
    }

    #[test]
    fn requires_registered_counterpart() {
        let identity = ServerIdentity::new(server_keys().clone());
        let payload = seal_and_sign(server_keys().public_key(), client_keys(), "hello").unwrap();
        assert!(matches!(
            open_and_verify(&identity, &payload),
            Err(CryptoError::PreconditionFailed(_))
        ));
    }

    #[test]
    fn signature_from_unregistered_key_is_rejected() {
        let identity = identity_with_client();
        let payload =
            seal_and_sign(server_keys().public_key(), other_client_keys(), "hello").unwrap();
        assert!(matches!(
            open_and_verify(&identity, &payload),
            Err(CryptoError::AuthenticationFailure(AuthFailure::Signature))
        ));
    }

    #[test]
    fn signature_is_checked_before_decryption() {
        let identity = identity_with_client();
        // Undecryptable ciphertext with a bad signature must fail on the
        // signature, never reaching the OAEP step.
        let payload = SignedPayload::new(vec![0x42; 256], vec![0x17; 256]);
        assert!(matches!(
            open_and_verify(&identity, &payload),
            Err(CryptoError::AuthenticationFailure(AuthFailure::Signature))
        ));
    }

    #[test]
    fn tampered_ciphertext_fails_signature() {
        let identity = identity_with_client();
        let payload = seal_and_sign(server_keys().public_key(), client_keys(), "hello").unwrap();
        let mut data = payload.encrypted_data().to_vec();
        data[10] ^= 0x01;
        let tampered = SignedPayload::new(data, payload.signature().to_vec());
        assert!(matches!(
            open_and_verify(&identity, &tampered),
            Err(CryptoError::AuthenticationFailure(AuthFailure::Signature))
        ));
    }

    #[test]
    fn signed_garbage_fails_padding() {
        let identity = identity_with_client();
        let garbage = vec![0x42; 256];
        let signature = SigningKey::<Sha256>::new(client_keys().private_key().clone())
            .sign(&garbage)
            .to_vec();
        let payload = SignedPayload::new(garbage, signature);
        assert!(matches!(
            open_and_verify(&identity, &payload),
            Err(CryptoError::AuthenticationFailure(AuthFailure::Padding))
        ));
    }

    #[test]
    fn payload_encrypted_for_another_server_fails_padding() {
        let identity = identity_with_client();
        let payload =
            seal_and_sign(other_client_keys().public_key(), client_keys(), "hello").unwrap();
        assert!(matches!(
            open_and_verify(&identity, &payload),
            Err(CryptoError::AuthenticationFailure(AuthFailure::Padding))
        ));
    }

    #[test]
    fn non_utf8_plaintext_is_decode_error() {
        let identity = identity_with_client();
        let payload =
            seal_and_sign_bytes(server_keys().public_key(), client_keys(), &[0xff, 0xfe, 0x00])
                .unwrap();
        assert!(matches!(
            open_and_verify(&identity, &payload),
            Err(CryptoError::DecodeError(_))
        ));
    }

    #[test]
    fn plaintext_size_ceiling() {
        let recipient = server_keys().public_key();
        assert_eq!(max_plaintext_len(recipient), 190);

        let at_limit = "a".repeat(190);
        let payload = seal_and_sign(recipient, client_keys(), &at_limit).unwrap();
        assert_eq!(
            open_and_verify(&identity_with_client(), &payload).unwrap(),
            at_limit
        );

        let over_limit = "a".repeat(191);
        assert!(matches!(
            seal_and_sign(recipient, client_keys(), &over_limit),
            Err(CryptoError::InvalidInput(_))
        ));
    }

    #[test]
    fn reregistration_switches_accepted_signer() {
        let identity = identity_with_client();
        identity
            .register_counterpart(&other_client_keys().export_public().unwrap())
            .unwrap();

        let from_old = seal_and_sign(server_keys().public_key(), client_keys(), "hi").unwrap();
        assert!(open_and_verify(&identity, &from_old).is_err());

        let from_new =
            seal_and_sign(server_keys().public_key(), other_client_keys(), "hi").unwrap();
        assert_eq!(open_and_verify(&identity, &from_new).unwrap(), "hi");
    }

    #[test]
    fn wire_form_requires_both_fields() {
        let missing = EncodedPayload {
            encrypted_data: "AAAA".to_string(),
            signature: String::new(),
        };
        assert!(matches!(
            SignedPayload::decode(&missing),
            Err(CryptoError::InvalidInput(_))
        ));

        let bad = EncodedPayload {
            encrypted_data: "!!".to_string(),
            signature: "AAAA".to_string(),
        };
        assert!(matches!(
            SignedPayload::decode(&bad),
            Err(CryptoError::InvalidInput(_))
        ));
    }

    #[test]
    fn wire_form_uses_camel_case() {
        let payload = seal_and_sign(server_keys().public_key(), client_keys(), "x").unwrap();
        let json = serde_json::to_value(payload.encode()).unwrap();
        assert!(json.get("encryptedData").is_some());
        assert!(json.get("signature").is_some());

        let parsed: EncodedPayload = serde_json::from_value(json).unwrap();
        assert_eq!(SignedPayload::decode(&parsed).unwrap(), payload);
    }
}
