// dkim-archive – archive of historical DKIM public key records
// Copyright © 2023–2024 The dkim-archive contributors
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later
// version.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.

//! Key types and DER validation of published key material.
//!
//! # RSA keys in DNS
//!
//! RFC 6376, section 3.6.1 says the p= tag holds an RSAPublicKey (RFC 3447),
//! but the example in appendix C installs a SubjectPublicKeyInfo (RFC 5280).
//! Both forms are found in DNS, with SubjectPublicKeyInfo being the de facto
//! standard. Some published keys are neither and are simply broken.
//!
//! The archive stores whatever a domain published, but only if the key bytes
//! are at least well-formed DER. How strict that check is depends on the
//! [`DerValidator`] in use: [`DerStructure`] accepts any single well-formed
//! DER element, [`RsaPublicKeyDer`] requires an actual RSA public key in one
//! of the two forms above.

mod rsa;

pub use self::rsa::RsaPublicKeyDer;

use crate::util::CanonicalStr;
use pkcs8::der::{AnyRef, Decode, Encode, Reader, SliceReader, Tagged};
use std::fmt::{self, Display, Formatter};
use thiserror::Error;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum KeyType {
    Rsa,
    Ed25519,
}

impl KeyType {
    /// Interprets the value of a k= tag.
    pub fn from_tag_value(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("rsa") {
            Some(Self::Rsa)
        } else if value.eq_ignore_ascii_case("ed25519") {
            Some(Self::Ed25519)
        } else {
            None
        }
    }
}

impl CanonicalStr for KeyType {
    fn canonical_str(&self) -> &'static str {
        match self {
            Self::Rsa => "rsa",
            Self::Ed25519 => "ed25519",
        }
    }
}

impl Display for KeyType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rsa => write!(f, "RSA"),
            Self::Ed25519 => write!(f, "Ed25519"),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DerError {
    #[error("malformed DER: {0}")]
    Malformed(String),
    #[error("DER nesting too deep")]
    TooDeep,
    #[error("not an RSA public key")]
    NotRsaPublicKey,
}

impl From<pkcs8::der::Error> for DerError {
    fn from(e: pkcs8::der::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}

/// A capability that checks key bytes for DER well-formedness.
///
/// On success the canonical DER form of the input is returned.
pub trait DerValidator: Send + Sync {
    fn validate(&self, der: &[u8]) -> Result<Vec<u8>, DerError>;
}

impl<T: DerValidator + ?Sized> DerValidator for &T {
    fn validate(&self, der: &[u8]) -> Result<Vec<u8>, DerError> {
        (**self).validate(der)
    }
}

/// Accepts exactly one well-formed DER element, without trailing data.
///
/// Constructed elements are checked recursively, primitive contents (including
/// the BIT STRING wrapping a SubjectPublicKeyInfo key) are not looked into.
#[derive(Clone, Copy, Debug, Default)]
pub struct DerStructure;

const MAX_DEPTH: usize = 32;

impl DerValidator for DerStructure {
    fn validate(&self, der: &[u8]) -> Result<Vec<u8>, DerError> {
        let element = AnyRef::from_der(der)?;

        check_nested(element, 0)?;

        Ok(element.to_der()?)
    }
}

fn check_nested(element: AnyRef<'_>, depth: usize) -> Result<(), DerError> {
    if !element.tag().is_constructed() {
        return Ok(());
    }
    if depth >= MAX_DEPTH {
        return Err(DerError::TooDeep);
    }

    let mut reader = SliceReader::new(element.value())?;
    while !reader.is_finished() {
        let child = AnyRef::decode(&mut reader)?;
        check_nested(child, depth + 1)?;
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// RSA 2048 public key, SubjectPublicKeyInfo.
    pub const RSA_SPKI_BASE64: &str = "\
MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEAvXEn6j24wx68Zs5djoKQ\
LFXcGUUPzvAAfrc9RKzBQG+dglfdCqZy2ZFai4SlLivvkkCU+0wXl+ExSSY5xEiQ\
k7m3YQZbeIAeSWUTLe7asTri73c7nX5D7+1KKWUarMHKLeWN5F9Re8uOfWrgZdYC\
20bfoptbMQLLPcbfchP9Z7epZRwdi6xeZySFO2JnwyK2kEay7VpF7YivwQzMohF2\
hlQ9OshDIa2w7uudKp5jAcOVymPTi3iu6tEI/3NNkcezukVawN6bLkZf6IEE3Gap\
2oD3pidf51iAfb7BBbeE36Hl3dPxAgfsSrc/v2HTRMYeeBb7fjFC50ImvxjtmFUI\
xQIDAQAB";

    /// Ed25519 public key, SubjectPublicKeyInfo.
    pub const ED25519_SPKI_BASE64: &str = "MCowBQYDK2VwAyEA9VXMCgG0fXGIzwV7eOxKhz+Pe6DRmOBYjyvVoVrc/Dw=";
}
