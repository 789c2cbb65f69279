//! Path: ordered token sequence identifying a location within document state.
//!
//! A path is the addressing scheme used by every `Op` to name the state it
//! mutates. Empty tokens are never stored — a token of `""` is silently
//! dropped at construction, which gives the empty-root convention described
//! in the schema routing rules a single, uniform representation.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// An ordered sequence of non-empty tokens identifying a location in state.
///
/// `Path::empty()` denotes the root of a document (or of whatever schema
/// node is currently handling an operation after routing has consumed the
/// tokens leading to it).
///
/// Serializes as its [`Path::encode`]d string, per the wire shape
/// `{kind, path, payload}` where `path` is a single encoded-tokens
/// string, not a JSON array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Path {
    tokens: Vec<String>,
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Path {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Ok(Path::decode(&encoded))
    }
}

impl Path {
    /// The root path — no tokens.
    pub fn empty() -> Self {
        Path { tokens: Vec::new() }
    }

    /// Build a path from a token iterator, dropping any empty tokens.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Path {
            tokens: tokens
                .into_iter()
                .map(Into::into)
                .filter(|t: &String| !t.is_empty())
                .collect(),
        }
    }

    /// The ordered tokens of this path (never contains an empty string).
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Return a new path with `token` appended. An empty token is dropped,
    /// leaving the path unchanged.
    pub fn append(&self, token: impl Into<String>) -> Path {
        let token = token.into();
        let mut tokens = self.tokens.clone();
        if !token.is_empty() {
            tokens.push(token);
        }
        Path { tokens }
    }

    /// Return a new path with `other`'s tokens appended after this path's.
    pub fn concat(&self, other: &Path) -> Path {
        let mut tokens = self.tokens.clone();
        tokens.extend(other.tokens.iter().cloned());
        Path { tokens }
    }

    /// Drop the first token, returning the remaining sub-path. A no-op on
    /// an already-empty path.
    pub fn shift(&self) -> Path {
        if self.tokens.is_empty() {
            Path::empty()
        } else {
            Path {
                tokens: self.tokens[1..].to_vec(),
            }
        }
    }

    /// Drop the last token, returning the remaining sub-path. A no-op on
    /// an already-empty path.
    pub fn pop(&self) -> Path {
        if self.tokens.is_empty() {
            Path::empty()
        } else {
            Path {
                tokens: self.tokens[..self.tokens.len() - 1].to_vec(),
            }
        }
    }

    /// The first token, if any.
    pub fn head(&self) -> Option<&str> {
        self.tokens.first().map(String::as_str)
    }

    pub fn equals(a: &Path, b: &Path) -> bool {
        a == b
    }

    /// True iff `p`'s tokens are a prefix of `q`'s tokens (including when
    /// `p == q`).
    pub fn is_prefix(p: &Path, q: &Path) -> bool {
        p.tokens.len() <= q.tokens.len() && p.tokens.iter().eq(q.tokens[..p.tokens.len()].iter())
    }

    /// True iff one of `a`, `b` is a prefix of the other.
    pub fn overlap(a: &Path, b: &Path) -> bool {
        Path::is_prefix(a, b) || Path::is_prefix(b, a)
    }

    /// Stable string encoding, bijective with the token sequence. Used
    /// as the wire representation of `Path` (see the `Serialize` impl
    /// above) and as the dedup key. Each token is length-prefixed so the
    /// encoding round-trips regardless of token content (including tokens
    /// containing the separator character used cosmetically below).
    pub fn encode(&self) -> String {
        let mut out = String::new();
        for token in &self.tokens {
            out.push_str(&token.len().to_string());
            out.push(':');
            out.push_str(token);
        }
        out
    }

    /// Inverse of [`Path::encode`].
    pub fn decode(encoded: &str) -> Path {
        let bytes = encoded.as_bytes();
        let mut tokens = Vec::new();
        let mut i = 0;
        while i < bytes.len() {
            let colon = match encoded[i..].find(':') {
                Some(offset) => i + offset,
                None => break,
            };
            let len: usize = match encoded[i..colon].parse() {
                Ok(n) => n,
                Err(_) => break,
            };
            let start = colon + 1;
            let end = start + len;
            if end > encoded.len() {
                break;
            }
            tokens.push(encoded[start..end].to_string());
            i = end;
        }
        Path { tokens }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.tokens.join("/"))
    }
}

impl From<Vec<String>> for Path {
    fn from(tokens: Vec<String>) -> Self {
        Path::from_tokens(tokens)
    }
}
