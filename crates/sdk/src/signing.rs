// Copyright 2025 chenjjiaa
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Account keys and write signing
//!
//! A [`Signer`] is the connected account: it owns a private key, derives the
//! account [`Address`] from the public key and signs every write before it is
//! submitted. The ledger verifies the signature and that the address matches
//! the public key.
//!
//! Signing message: canonical JSON of `(from, call, options)`. ECDSA signs the
//! SHA-256 digest of that message, Ed25519 signs the message directly.

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier, VerifyingKey};
use k256::ecdsa::{
	Signature as EcdsaSignature, SigningKey as EcdsaSigningKey, VerifyingKey as EcdsaVerifyingKey,
};
use rand::rngs::OsRng;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::types::{Address, SignedWrite, TxOptions, WriteCall};

/// Error types for signing operations
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
	#[error("Serialization error: {0}")]
	Serialization(String),
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	#[error("Invalid signature: {0}")]
	InvalidSignature(String),
	#[error("Unsupported signature algorithm: {0}")]
	UnsupportedAlgorithm(String),
	#[error("Sender {claimed} does not match public key address {derived}")]
	AddressMismatch { claimed: Address, derived: Address },
}

/// Signature algorithm type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureAlgorithm {
	Ed25519,
	Ecdsa,
}

impl SignatureAlgorithm {
	pub fn as_str(self) -> &'static str {
		match self {
			SignatureAlgorithm::Ed25519 => "ed25519",
			SignatureAlgorithm::Ecdsa => "ecdsa",
		}
	}

	pub fn parse(hint: &str) -> Result<Self, SigningError> {
		match hint.trim().to_ascii_lowercase().as_str() {
			"ed25519" => Ok(SignatureAlgorithm::Ed25519),
			"ecdsa" | "secp256k1" => Ok(SignatureAlgorithm::Ecdsa),
			other => Err(SigningError::UnsupportedAlgorithm(other.to_string())),
		}
	}
}

enum KeyMaterial {
	Ed25519(SigningKey),
	Ecdsa(EcdsaSigningKey),
}

/// Connected account able to sign writes
pub struct Signer {
	key: KeyMaterial,
	public_key: Vec<u8>,
	address: Address,
}

impl Signer {
	/// Generate a fresh random key
	pub fn generate(algorithm: SignatureAlgorithm) -> Self {
		let key = match algorithm {
			SignatureAlgorithm::Ed25519 => KeyMaterial::Ed25519(SigningKey::generate(&mut OsRng)),
			SignatureAlgorithm::Ecdsa => KeyMaterial::Ecdsa(EcdsaSigningKey::random(&mut OsRng)),
		};
		Self::from_key(key)
	}

	/// Load a 32-byte private key from hex (optional `0x` prefix)
	pub fn from_hex(algorithm: SignatureAlgorithm, private_key: &str) -> Result<Self, SigningError> {
		let trimmed = private_key.trim();
		let body = trimmed.strip_prefix("0x").unwrap_or(trimmed);
		let bytes = hex::decode(body).map_err(|e| SigningError::InvalidKey(e.to_string()))?;
		let bytes: [u8; 32] = bytes
			.try_into()
			.map_err(|_| SigningError::InvalidKey("expected 32 bytes".to_string()))?;

		let key = match algorithm {
			SignatureAlgorithm::Ed25519 => KeyMaterial::Ed25519(SigningKey::from_bytes(&bytes)),
			SignatureAlgorithm::Ecdsa => KeyMaterial::Ecdsa(
				EcdsaSigningKey::from_bytes(&bytes.into())
					.map_err(|e| SigningError::InvalidKey(e.to_string()))?,
			),
		};
		Ok(Self::from_key(key))
	}

	fn from_key(key: KeyMaterial) -> Self {
		let public_key = match &key {
			KeyMaterial::Ed25519(k) => k.verifying_key().to_bytes().to_vec(),
			KeyMaterial::Ecdsa(k) => k.verifying_key().to_sec1_bytes().to_vec(),
		};
		let address = address_from_public_key(&public_key);
		Self {
			key,
			public_key,
			address,
		}
	}

	pub fn algorithm(&self) -> SignatureAlgorithm {
		match self.key {
			KeyMaterial::Ed25519(_) => SignatureAlgorithm::Ed25519,
			KeyMaterial::Ecdsa(_) => SignatureAlgorithm::Ecdsa,
		}
	}

	pub fn address(&self) -> &Address {
		&self.address
	}

	pub fn public_key(&self) -> &[u8] {
		&self.public_key
	}

	/// Sign a write and wrap it for submission
	pub fn sign_write(&self, call: WriteCall, options: TxOptions) -> Result<SignedWrite, SigningError> {
		let message = signing_payload(&self.address, &call, &options)?;
		let signature = match &self.key {
			KeyMaterial::Ed25519(k) => k.sign(&message).to_bytes().to_vec(),
			KeyMaterial::Ecdsa(k) => {
				use k256::ecdsa::signature::Signer as _;
				let digest = Sha256::digest(&message);
				let sig: EcdsaSignature = k.sign(&digest[..]);
				sig.to_bytes().to_vec()
			}
		};

		Ok(SignedWrite {
			from: self.address.clone(),
			call,
			options,
			public_key: hex::encode(&self.public_key),
			algorithm: self.algorithm().as_str().to_string(),
			signature: hex::encode(signature),
		})
	}
}

impl std::fmt::Debug for Signer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Signer")
			.field("algorithm", &self.algorithm())
			.field("address", &self.address)
			.finish_non_exhaustive()
	}
}

/// Account address: last 20 bytes of SHA-256(public key)
pub fn address_from_public_key(public_key: &[u8]) -> Address {
	let digest = Sha256::digest(public_key);
	let mut bytes = [0u8; 20];
	bytes.copy_from_slice(&digest[12..]);
	Address::from_bytes(bytes)
}

#[derive(Serialize)]
struct SigningPayload<'a> {
	from: &'a Address,
	call: &'a WriteCall,
	options: &'a TxOptions,
}

/// Canonical message signed for a write
pub fn signing_payload(
	from: &Address,
	call: &WriteCall,
	options: &TxOptions,
) -> Result<Vec<u8>, SigningError> {
	serde_json::to_vec(&SigningPayload {
		from,
		call,
		options,
	})
	.map_err(|e| SigningError::Serialization(e.to_string()))
}

/// Verify a signed write: signature validity and sender/public-key binding
pub fn verify_signed_write(write: &SignedWrite) -> Result<(), SigningError> {
	let algorithm = SignatureAlgorithm::parse(&write.algorithm)?;
	let public_key =
		hex::decode(&write.public_key).map_err(|e| SigningError::InvalidKey(e.to_string()))?;
	let derived = address_from_public_key(&public_key);
	if derived != write.from {
		return Err(SigningError::AddressMismatch {
			claimed: write.from.clone(),
			derived,
		});
	}

	let sig_bytes = hex::decode(&write.signature)
		.map_err(|e| SigningError::InvalidSignature(format!("Invalid hex: {}", e)))?;
	let message = signing_payload(&write.from, &write.call, &write.options)?;

	match algorithm {
		SignatureAlgorithm::Ed25519 => {
			let key_bytes: [u8; 32] = public_key
				.try_into()
				.map_err(|_| SigningError::InvalidKey("expected 32 bytes".to_string()))?;
			let verifying_key = VerifyingKey::from_bytes(&key_bytes)
				.map_err(|e| SigningError::InvalidKey(e.to_string()))?;
			let sig_array: [u8; 64] = sig_bytes
				.try_into()
				.map_err(|_| SigningError::InvalidSignature("Invalid signature length".to_string()))?;
			verifying_key
				.verify(&message, &Signature::from_bytes(&sig_array))
				.map_err(|e| SigningError::InvalidSignature(e.to_string()))
		}
		SignatureAlgorithm::Ecdsa => {
			use k256::ecdsa::signature::Verifier as _;
			let verifying_key = EcdsaVerifyingKey::from_sec1_bytes(&public_key)
				.map_err(|e| SigningError::InvalidKey(e.to_string()))?;
			let signature = EcdsaSignature::from_slice(&sig_bytes)
				.map_err(|e| SigningError::InvalidSignature(e.to_string()))?;
			let digest = Sha256::digest(&message);
			verifying_key
				.verify(&digest[..], &signature)
				.map_err(|e| SigningError::InvalidSignature(e.to_string()))
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn close_call() -> WriteCall {
		WriteCall::CloseMatch { match_id: 1 }
	}

	#[test]
	fn test_sign_and_verify_ed25519() {
		let signer = Signer::generate(SignatureAlgorithm::Ed25519);
		let write = signer
			.sign_write(close_call(), TxOptions::with_gas_limit(100_000))
			.unwrap();
		assert_eq!(write.algorithm, "ed25519");
		assert_eq!(&write.from, signer.address());
		verify_signed_write(&write).unwrap();
	}

	#[test]
	fn test_sign_and_verify_ecdsa() {
		let signer = Signer::generate(SignatureAlgorithm::Ecdsa);
		let write = signer
			.sign_write(close_call(), TxOptions::with_gas_limit(100_000))
			.unwrap();
		assert_eq!(write.algorithm, "ecdsa");
		verify_signed_write(&write).unwrap();
	}

	#[test]
	fn test_tampered_write_fails_verification() {
		let signer = Signer::generate(SignatureAlgorithm::Ed25519);
		let mut write = signer
			.sign_write(close_call(), TxOptions::with_gas_limit(100_000))
			.unwrap();
		write.call = WriteCall::CloseMatch { match_id: 2 };
		assert!(matches!(
			verify_signed_write(&write),
			Err(SigningError::InvalidSignature(_))
		));
	}

	#[test]
	fn test_spoofed_sender_fails_verification() {
		let signer = Signer::generate(SignatureAlgorithm::Ecdsa);
		let other = Signer::generate(SignatureAlgorithm::Ecdsa);
		let mut write = signer
			.sign_write(close_call(), TxOptions::with_gas_limit(100_000))
			.unwrap();
		write.from = other.address().clone();
		assert!(matches!(
			verify_signed_write(&write),
			Err(SigningError::AddressMismatch { .. })
		));
	}

	#[test]
	fn test_from_hex_is_deterministic() {
		let key = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
		let a = Signer::from_hex(SignatureAlgorithm::Ed25519, key).unwrap();
		let b = Signer::from_hex(SignatureAlgorithm::Ed25519, key).unwrap();
		assert_eq!(a.address(), b.address());
		assert!(Signer::from_hex(SignatureAlgorithm::Ed25519, "0x1234").is_err());
	}

	#[test]
	fn test_algorithm_parse() {
		assert_eq!(
			SignatureAlgorithm::parse("secp256k1").unwrap(),
			SignatureAlgorithm::Ecdsa
		);
		assert_eq!(
			SignatureAlgorithm::parse(" Ed25519 ").unwrap(),
			SignatureAlgorithm::Ed25519
		);
		assert!(SignatureAlgorithm::parse("rsa").is_err());
	}
}
