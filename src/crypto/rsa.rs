use crate::crypto::{DerError, DerValidator};
use rsa::{pkcs1::DecodeRsaPublicKey, pkcs8::DecodePublicKey, traits::PublicKeyParts, RsaPublicKey};
use tracing::trace;

/// Accepts only RSA public keys, in SubjectPublicKeyInfo or RSAPublicKey form.
#[derive(Clone, Copy, Debug, Default)]
pub struct RsaPublicKeyDer;

impl DerValidator for RsaPublicKeyDer {
    fn validate(&self, der: &[u8]) -> Result<Vec<u8>, DerError> {
        // first try reading data as SubjectPublicKeyInfo (*de facto* format),
        // then as RSAPublicKey (what the RFC actually specifies)
        let public_key = RsaPublicKey::from_public_key_der(der)
            .or_else(|_| RsaPublicKey::from_pkcs1_der(der))
            .map_err(|_| DerError::NotRsaPublicKey)?;

        trace!(bits = public_key.size() * 8, "read RSA public key");

        Ok(der.to_vec())
    }
}
