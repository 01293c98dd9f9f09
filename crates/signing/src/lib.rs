#![deny(clippy::pedantic, unsafe_code)]

//! RSA signature checks for chunklists
//!
//! Chunklists are signed with RSA-2048 PKCS#1 v1.5 over a SHA-256 digest.
//! The signature block is stored little endian on disk.

use macfetch_errors::{Error, SigningError};
use macfetch_hash::Hash;
use rsa::{BigUint, Pkcs1v15Sign, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;

/// Public exponent used by every chunklist signing key
pub const PUBLIC_EXPONENT: u32 = 65_537;

/// Size of an RSA-2048 signature block
pub const SIGNATURE_LEN: usize = 256;

const APPLE_EFI_ROM_MODULUS: &str = concat!(
    "C3E748CAD9CD384329E10E25A91E43E1A762FF529ADE578C935BDDF9B13F2179",
    "D4855E6FC89E9E29CA12517D17DFA1EDCE0BEBF0EA7B461FFE61D94E2BDF72C1",
    "96F89ACD3536B644064014DAE25A15DB6BB0852ECBD120916318D1CCDEA3C84C",
    "92ED743FC176D0BACA920D3FCF3158AFF731F88CE0623182A8ED67E650515F75",
    "745909F07D415F55FC15A35654D118C55A462D37A3ACDA08612F3F3F6571761E",
    "FCCBCC299AEE99B3A4FD6212CCFFF5EF37A2C334E871191F7E1C31960E010A54",
    "E86FA3F62E6D6905E1CD57732410A3EB0C6B4DEFDABE9F59BF1618758C751CD5",
    "6CEF851D1C0EAA1C558E37AC108DA9089863D20E2E7E4BF475EC66FE6B3EFDCF",
);

/// Configured form of a trusted key: an id and a hex RSA modulus
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrustedKeyRef {
    pub id: String,
    pub modulus: String,
}

/// A public key accepted for chunklist signatures
#[derive(Clone, PartialEq, Eq)]
pub struct TrustedKey {
    id: String,
    key: RsaPublicKey,
}

impl TrustedKey {
    /// The key that signs recovery and installer chunklists
    ///
    /// # Errors
    /// Returns an error if the embedded modulus cannot be turned into a key.
    pub fn apple_efi_rom() -> Result<Self, Error> {
        Self::from_modulus_hex("apple-efi-rom-1", APPLE_EFI_ROM_MODULUS)
    }

    /// Build a key from a big-endian hex modulus and the fixed exponent
    ///
    /// # Errors
    /// Returns an error if the modulus is not valid hex or is not a valid RSA modulus.
    pub fn from_modulus_hex(id: impl Into<String>, modulus: &str) -> Result<Self, Error> {
        let modulus = modulus.trim().trim_start_matches("0x");
        let bytes = hex::decode(modulus)
            .map_err(|e| SigningError::InvalidPublicKey(format!("modulus is not hex: {e}")))?;
        let key = RsaPublicKey::new(
            BigUint::from_bytes_be(&bytes),
            BigUint::from(PUBLIC_EXPONENT),
        )
        .map_err(|e| SigningError::InvalidPublicKey(e.to_string()))?;
        Ok(Self::from_public_key(id, key))
    }

    #[must_use]
    pub fn from_public_key(id: impl Into<String>, key: RsaPublicKey) -> Self {
        Self { id: id.into(), key }
    }

    /// Resolve a configured key reference
    ///
    /// # Errors
    /// Returns an error if the modulus is invalid.
    pub fn from_ref(key_ref: &TrustedKeyRef) -> Result<Self, Error> {
        Self::from_modulus_hex(key_ref.id.clone(), &key_ref.modulus)
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.key
    }
}

impl fmt::Debug for TrustedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustedKey").field("id", &self.id).finish()
    }
}

/// Built-in keys plus any configured extras
///
/// # Errors
/// Returns an error if any configured key is malformed.
pub fn trusted_keys(extra: &[TrustedKeyRef]) -> Result<Vec<TrustedKey>, Error> {
    let mut keys = vec![TrustedKey::apple_efi_rom()?];
    for key_ref in extra {
        keys.push(TrustedKey::from_ref(key_ref)?);
    }
    Ok(keys)
}

/// Reverse a little-endian signature block into the big-endian form RSA expects
#[must_use]
pub fn signature_from_le(signature: &[u8]) -> Vec<u8> {
    signature.iter().rev().copied().collect()
}

/// Verify an on-disk (little-endian) signature over `digest` using any of the trusted keys.
/// Returns the key id that successfully verified.
///
/// # Errors
/// Returns an error if no keys are supplied, the signature block has the wrong size,
/// or no trusted key verifies the digest.
pub fn verify_digest_with_keys(
    digest: &Hash,
    signature_le: &[u8],
    trusted_keys: &[TrustedKey],
) -> Result<String, Error> {
    if trusted_keys.is_empty() {
        return Err(SigningError::NoTrustedKeys.into());
    }

    if signature_le.len() != SIGNATURE_LEN {
        return Err(SigningError::InvalidSignatureFormat(format!(
            "expected {SIGNATURE_LEN} bytes, got {}",
            signature_le.len()
        ))
        .into());
    }

    let signature = signature_from_le(signature_le);
    let mut last_err = None;
    for key in trusted_keys {
        match key
            .key
            .verify(Pkcs1v15Sign::new::<Sha256>(), digest.as_bytes(), &signature)
        {
            Ok(()) => {
                tracing::debug!(key_id = %key.id, "chunklist signature verified");
                return Ok(key.id.clone());
            }
            Err(e) => last_err = Some(format!("{}: {e}", key.id)),
        }
    }

    Err(SigningError::VerificationFailed {
        reason: format!(
            "no match among {} trusted keys (last error: {})",
            trusted_keys.len(),
            last_err.unwrap_or_else(|| "unknown".to_string())
        ),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs1::DecodeRsaPrivateKey;
    use rsa::RsaPrivateKey;

    const TEST_KEY: &str = include_str!("../tests/fixtures/test_signing_key.pem");

    fn test_key() -> RsaPrivateKey {
        RsaPrivateKey::from_pkcs1_pem(TEST_KEY).unwrap()
    }

    fn sign_le(key: &RsaPrivateKey, digest: &Hash) -> Vec<u8> {
        let mut sig = key
            .sign(Pkcs1v15Sign::new::<Sha256>(), digest.as_bytes())
            .unwrap();
        sig.reverse();
        sig
    }

    #[test]
    fn builtin_key_parses() {
        let key = TrustedKey::apple_efi_rom().unwrap();
        assert_eq!(key.id(), "apple-efi-rom-1");
        assert_eq!(rsa::traits::PublicKeyParts::size(key.public_key()), SIGNATURE_LEN);
    }

    #[test]
    fn verifies_with_matching_key() {
        let private = test_key();
        let trusted = TrustedKey::from_public_key("test", private.to_public_key());
        let digest = Hash::from_data(b"signed region");

        let id = verify_digest_with_keys(&digest, &sign_le(&private, &digest), &[trusted]).unwrap();
        assert_eq!(id, "test");
    }

    #[test]
    fn tries_every_key() {
        let private = test_key();
        let keys = vec![
            TrustedKey::apple_efi_rom().unwrap(),
            TrustedKey::from_public_key("test", private.to_public_key()),
        ];
        let digest = Hash::from_data(b"signed region");

        let id = verify_digest_with_keys(&digest, &sign_le(&private, &digest), &keys).unwrap();
        assert_eq!(id, "test");
    }

    #[test]
    fn rejects_other_digest() {
        let private = test_key();
        let trusted = TrustedKey::from_public_key("test", private.to_public_key());
        let sig = sign_le(&private, &Hash::from_data(b"one"));

        let err = verify_digest_with_keys(&Hash::from_data(b"two"), &sig, &[trusted]).unwrap_err();
        assert!(matches!(
            err,
            Error::Signing(SigningError::VerificationFailed { .. })
        ));
    }

    #[test]
    fn rejects_big_endian_signature() {
        let private = test_key();
        let trusted = TrustedKey::from_public_key("test", private.to_public_key());
        let digest = Hash::from_data(b"region");
        let mut sig = sign_le(&private, &digest);
        sig.reverse();

        assert!(verify_digest_with_keys(&digest, &sig, &[trusted]).is_err());
    }

    #[test]
    fn empty_key_set() {
        let err = verify_digest_with_keys(&Hash::from_data(b"x"), &[0u8; 256], &[]).unwrap_err();
        assert!(matches!(err, Error::Signing(SigningError::NoTrustedKeys)));
    }

    #[test]
    fn wrong_signature_length() {
        let key = TrustedKey::apple_efi_rom().unwrap();
        let err = verify_digest_with_keys(&Hash::from_data(b"x"), &[0u8; 32], &[key]).unwrap_err();
        assert!(matches!(
            err,
            Error::Signing(SigningError::InvalidSignatureFormat(_))
        ));
    }

    #[test]
    fn bad_modulus_hex() {
        assert!(TrustedKey::from_modulus_hex("bad", "not-hex").is_err());
    }
}
