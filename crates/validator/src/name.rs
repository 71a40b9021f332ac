// SPDX-FileCopyrightText: 2022 Profian Inc. <opensource@profian.com>
// SPDX-License-Identifier: Apache-2.0

//! Hierarchical NDN names and their URI representation.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, bail, Result};
use serde::de::Error;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A single opaque name component.
///
/// Components sort in NDN canonical order: a shorter component comes first,
/// components of equal length compare bytewise.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Component(Vec<u8>);

impl Component {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parses one URI-escaped component.
    pub fn from_escaped(s: &str) -> Result<Self> {
        if !s.is_empty() && s.bytes().all(|b| b == b'.') {
            if s.len() < 3 {
                bail!("invalid name component {:?}", s);
            }
            return Ok(Self(vec![b'.'; s.len() - 3]));
        }

        let raw = s.as_bytes();
        let mut out = Vec::with_capacity(raw.len());
        let mut i = 0;
        while i < raw.len() {
            if raw[i] == b'%' {
                let hex = raw
                    .get(i + 1..i + 3)
                    .filter(|h| h.iter().all(u8::is_ascii_hexdigit))
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .ok_or_else(|| anyhow!("bad escape at byte {} of {:?}", i, s))?;
                out.push(u8::from_str_radix(hex, 16)?);
                i += 3;
            } else {
                out.push(raw[i]);
                i += 1;
            }
        }
        Ok(Self(out))
    }

    /// URI-escaped text of this component.
    pub fn to_escaped(&self) -> String {
        if self.0.iter().all(|b| *b == b'.') {
            return ".".repeat(self.0.len() + 3);
        }

        let mut out = String::with_capacity(self.0.len());
        for b in &self.0 {
            match b {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                    out.push(*b as char)
                }
                _ => out.push_str(&format!("%{:02X}", b)),
            }
        }
        out
    }
}

impl From<&str> for Component {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_escaped())
    }
}

impl Ord for Component {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for Component {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// An ordered sequence of components.
///
/// The derived ordering compares component by component, so a name sorts
/// immediately before every name it is a prefix of.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(Vec<Component>);

impl Name {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn components(&self) -> &[Component] {
        &self.0
    }

    /// Component at `index`; negative values count from the end.
    pub fn get(&self, index: isize) -> Option<&Component> {
        let i = if index < 0 {
            self.0.len().checked_sub(index.unsigned_abs())?
        } else {
            index as usize
        };
        self.0.get(i)
    }

    /// The first `n` components; negative `n` drops components from the end.
    pub fn prefix(&self, n: isize) -> Name {
        let end = if n < 0 {
            self.0.len().saturating_sub(n.unsigned_abs())
        } else {
            (n as usize).min(self.0.len())
        };
        Name(self.0[..end].to_vec())
    }

    pub fn sub_name(&self, start: usize, end: usize) -> Name {
        let end = end.min(self.0.len());
        let start = start.min(end);
        Name(self.0[start..end].to_vec())
    }

    pub fn append(mut self, component: impl Into<Component>) -> Self {
        self.0.push(component.into());
        self
    }

    pub fn push(&mut self, component: Component) {
        self.0.push(component);
    }

    pub fn extend(&mut self, other: &Name) {
        self.0.extend(other.0.iter().cloned());
    }

    pub fn is_prefix_of(&self, other: &Name) -> bool {
        self.0.len() <= other.0.len() && self.0[..] == other.0[..self.0.len()]
    }

    pub fn to_uri(&self) -> String {
        self.to_string()
    }
}

impl From<Vec<Component>> for Name {
    fn from(components: Vec<Component>) -> Self {
        Self(components)
    }
}

impl From<&[Component]> for Name {
    fn from(components: &[Component]) -> Self {
        Self(components.to_vec())
    }
}

impl FromStr for Name {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let s = s.strip_prefix("ndn:").unwrap_or(s);
        s.split('/')
            .filter(|c| !c.is_empty())
            .map(Component::from_escaped)
            .collect::<Result<Vec<_>>>()
            .map(Name)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for c in &self.0 {
            write!(f, "/{}", c)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self)
    }
}

impl Serialize for Name {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Name {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(|e| D::Error::custom(format!("{}", e)))
    }
}
