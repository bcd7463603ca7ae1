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

//! Key material of DKIM public key records.

use crate::{
    crypto::{DerError, DerValidator, KeyType},
    tag_list::TagList,
    util::{decode_base64_lenient, encode_base64},
};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum KeyMaterialError {
    #[error("p= tag missing")]
    MissingPublicKey,
    #[error("unknown key type {0:?}")]
    UnknownKeyType(String),
    #[error("p= tag contains no Base64 data")]
    InvalidBase64,
    #[error("invalid DER encoding: {0}")]
    InvalidDerEncoding(#[source] DerError),
}

/// The key type and normalized key data of a public key record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyMaterial {
    pub key_type: KeyType,
    /// Standard padded Base64 of the key bytes; empty for a revoked key.
    pub key_data_base64: String,
}

impl KeyMaterial {
    /// Extracts and validates the key material of a parsed tag list.
    pub fn decode<V>(tag_list: &TagList, der_validator: &V) -> Result<Self, KeyMaterialError>
    where
        V: DerValidator + ?Sized,
    {
        // §3.6.1: k= defaults to "rsa"
        let key_type = match tag_list.get("k") {
            None => KeyType::Rsa,
            Some(value) => KeyType::from_tag_value(value)
                .ok_or_else(|| KeyMaterialError::UnknownKeyType(value.into()))?,
        };

        let p = tag_list
            .get("p")
            .ok_or(KeyMaterialError::MissingPublicKey)?
            .trim();

        // §3.6.1: an empty p= tag means the key has been revoked
        if p.is_empty() {
            return Ok(Self {
                key_type,
                key_data_base64: String::new(),
            });
        }

        let key_data = decode_base64_lenient(p);
        if key_data.is_empty() {
            return Err(KeyMaterialError::InvalidBase64);
        }

        let key_data = match key_type {
            KeyType::Rsa => der_validator
                .validate(&key_data)
                .map_err(KeyMaterialError::InvalidDerEncoding)?,
            KeyType::Ed25519 => key_data,
        };

        Ok(Self {
            key_type,
            key_data_base64: encode_base64(key_data),
        })
    }

    /// Parses a raw TXT record value and extracts its key material.
    pub fn from_record_value<V>(value: &str, der_validator: &V) -> Result<Self, KeyMaterialError>
    where
        V: DerValidator + ?Sized,
    {
        Self::decode(&TagList::parse(value), der_validator)
    }

    pub fn is_revoked(&self) -> bool {
        self.key_data_base64.is_empty()
    }
}
