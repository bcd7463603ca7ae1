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

use base64::{
    alphabet,
    engine::{general_purpose::STANDARD, DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};

/// A trait for entities that can be represented as a canonical string.
pub trait CanonicalStr {
    /// Returns the canonical representation as a static string slice.
    fn canonical_str(&self) -> &'static str;
}

const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::RequireNone),
);

/// Encodes binary data as a padded, standard-alphabet Base64 string.
pub fn encode_base64<T: AsRef<[u8]>>(input: T) -> String {
    STANDARD.encode(input)
}

/// Decodes Base64 data the forgiving way DNS-published keys demand.
///
/// Characters outside the Base64 alphabet (whitespace, stray quotes, line
/// noise) are dropped, the URL-safe characters `-` and `_` are read as `+` and
/// `/`, and decoding stops at the first `=`. A dangling final character that
/// cannot contribute a whole byte is discarded. This never fails; garbage input
/// simply decodes to fewer (or zero) bytes.
pub fn decode_base64_lenient(input: &str) -> Vec<u8> {
    let mut cleaned: String = input
        .chars()
        .take_while(|&c| c != '=')
        .filter_map(|c| match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '+' | '/' => Some(c),
            '-' => Some('+'),
            '_' => Some('/'),
            _ => None,
        })
        .collect();

    if cleaned.len() % 4 == 1 {
        cleaned.pop();
    }

    // Only alphabet characters remain and the length is never 1 mod 4, so the
    // lenient engine cannot reject the input.
    LENIENT.decode(cleaned).unwrap_or_default()
}
