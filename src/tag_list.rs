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

//! Relaxed parsing of the DKIM tag=value list.
//!
//! Records found in the wild are often not well-formed according to RFC 6376,
//! section 3.2 (bare LF folding, stray separators, repeated tags). An archive
//! wants to keep them anyway, so the parser here never fails: it picks up
//! whatever `name=value` pairs it can find and ignores the rest.

use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagSpec {
    pub name: Box<str>,
    pub value: Box<str>,
}

/// A parsed tag list, in order of first appearance.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagList(Vec<TagSpec>);

impl AsRef<[TagSpec]> for TagList {
    fn as_ref(&self) -> &[TagSpec] {
        &self.0
    }
}

impl TagList {
    /// Parses a raw TXT record value.
    ///
    /// The input is split at `;`, and each segment at its first `=`. Names and
    /// values are trimmed. Segments without `=` or with an empty name are
    /// skipped, and for repeated names only the first occurrence is kept.
    pub fn parse(raw: &str) -> Self {
        let mut tags: Vec<TagSpec> = vec![];

        for segment in raw.split(';') {
            let Some((name, value)) = segment.split_once('=') else {
                continue;
            };

            let name = name.trim();
            if name.is_empty() {
                continue;
            }

            if tags.iter().any(|t| &*t.name == name) {
                continue;
            }

            tags.push(TagSpec {
                name: name.into(),
                value: value.trim().into(),
            });
        }

        Self(tags)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|t| &*t.name == name)
            .map(|t| &*t.value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|t| (&*t.name, &*t.value))
    }

    pub fn into_map(self) -> HashMap<String, String> {
        self.0
            .into_iter()
            .map(|t| (t.name.into(), t.value.into()))
            .collect()
    }
}
