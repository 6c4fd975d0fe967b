//! Private key loading.
//!
//! Keys arrive as PEM, typically an `EC PRIVATE KEY` block encrypted under a
//! password supplied at startup. The password is consumed here and nowhere
//! else; after parsing only the key material itself is retained.

use openssl::ec::EcKey;
use openssl::pkey::{Id, PKey, Private};

use crate::error::{Result, SigningError};

/// A parsed signing key, tagged by algorithm.
pub enum SigningKey {
    /// ECDSA over a NIST curve (P-256 in practice), SHA-512 message digest
    Ecdsa(EcKey<Private>),
    /// Ed25519, signed over the raw message
    Ed25519(PKey<Private>),
}

impl SigningKey {
    /// Parse a PEM-encoded private key, decrypting it with `password` when
    /// the block is encrypted.
    pub fn from_pem(pem: &[u8], password: &str) -> Result<Self> {
        let pkey = PKey::private_key_from_pem_passphrase(pem, password.as_bytes())
            .map_err(|e| SigningError::WrongPrivateKey(e.to_string()))?;
        match pkey.id() {
            Id::EC => Ok(Self::Ecdsa(pkey.ec_key()?)),
            Id::ED25519 => Ok(Self::Ed25519(pkey)),
            other => Err(SigningError::UnsupportedKeyType(format!("{other:?}"))),
        }
    }

    /// Algorithm label, for diagnostics
    pub fn algorithm(&self) -> &'static str {
        match self {
            Self::Ecdsa(_) => "ECDSA",
            Self::Ed25519(_) => "Ed25519",
        }
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SigningKey").field(&self.algorithm()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::ec::EcGroup;
    use openssl::nid::Nid;
    use openssl::symm::Cipher;

    #[test]
    fn test_load_encrypted_ec_pem() {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let key = EcKey::generate(&group).unwrap();
        let pem = key
            .private_key_to_pem_passphrase(Cipher::aes_256_cbc(), b"123456")
            .unwrap();

        let loaded = SigningKey::from_pem(&pem, "123456").unwrap();
        assert_eq!(loaded.algorithm(), "ECDSA");
    }

    #[test]
    fn test_wrong_password() {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let key = EcKey::generate(&group).unwrap();
        let pem = key
            .private_key_to_pem_passphrase(Cipher::aes_256_cbc(), b"correct")
            .unwrap();

        let err = SigningKey::from_pem(&pem, "wrong").unwrap_err();
        assert!(matches!(err, SigningError::WrongPrivateKey(_)));
    }

    #[test]
    fn test_load_ed25519_pem() {
        let pkey = PKey::generate_ed25519().unwrap();
        let pem = pkey.private_key_to_pem_pkcs8().unwrap();

        let loaded = SigningKey::from_pem(&pem, "").unwrap();
        assert_eq!(loaded.algorithm(), "Ed25519");
    }

    #[test]
    fn test_unsupported_key_type() {
        let rsa = openssl::rsa::Rsa::generate(2048).unwrap();
        let pem = rsa.private_key_to_pem().unwrap();

        let err = SigningKey::from_pem(&pem, "").unwrap_err();
        assert!(matches!(err, SigningError::UnsupportedKeyType(_)));
    }
}
