//! Request signing: computes the signature over the material and emits the
//! signature headers on the outgoing request.

mod keys;

pub use keys::SigningKey;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use openssl::ecdsa::EcdsaSig;
use sha2::{Digest, Sha512};
use tracing::debug;

use crate::error::Result;
use crate::headers;
use crate::material::Material;

/// Label under which the signature is published in `Signature`/`Signature-Input`
const SIGNATURE_ID: &str = "sig1";

/// Owns one private key and signs requests with it.
///
/// Shared read-only across all request handlers; signing needs no mutable
/// state.
#[derive(Debug)]
pub struct Signer {
    key_id: String,
    key: SigningKey,
}

impl Signer {
    pub fn new(key_id: impl Into<String>, key: SigningKey) -> Self {
        Self {
            key_id: key_id.into(),
            key,
        }
    }

    /// The `keyid=` parameter echoed in `Signature-Input`
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Sign the material and write `Signature-Input`, `Signature` and the
    /// signing-version marker into `headers`.
    pub fn sign_request(&self, material: &Material, headers: &mut HeaderMap) -> Result<()> {
        let (base, params) = material.signature_base(&self.key_id);
        let signature = BASE64.encode(self.raw_signature(&base)?);

        headers.insert(
            HeaderName::from_static(headers::SIGNATURE_INPUT),
            HeaderValue::from_str(&format!("{SIGNATURE_ID}={params}"))?,
        );
        headers.insert(
            HeaderName::from_static(headers::SIGNATURE),
            HeaderValue::from_str(&format!("{SIGNATURE_ID}=:{signature}:"))?,
        );
        headers.insert(
            HeaderName::from_static(headers::SIGNING_VERSION),
            HeaderValue::from_static(headers::SIGNING_VERSION_VALUE),
        );

        debug!(key_id = %self.key_id, algorithm = self.key.algorithm(), %params, "request signed");
        debug!(
            base = %String::from_utf8_lossy(&base).replace('\n', "\\n"),
            "signature base"
        );
        Ok(())
    }

    fn raw_signature(&self, message: &[u8]) -> Result<Vec<u8>> {
        match &self.key {
            SigningKey::Ecdsa(key) => {
                let digest = Sha512::digest(message);
                let signature = EcdsaSig::sign(digest.as_slice(), key)?;
                Ok(signature.to_der()?)
            }
            SigningKey::Ed25519(key) => {
                let mut signer = openssl::sign::Signer::new_without_digest(key)?;
                Ok(signer.sign_oneshot_to_vec(message)?)
            }
        }
    }
}
