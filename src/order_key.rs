//! OrderKey: densely-between-generable string keys for positioning
//! list/tree children.
//!
//! The core treats key generation as an external capability (see
//! `spec.md` §4.2 and the Design Notes in §9: "Fractional index generator
//! imported as a library"). `OrderKey` is the wire type — an opaque,
//! totally-ordered string — and `OrderKeyGenerator` is the trait the core
//! depends on. [`FractionalIndexGenerator`] is the default, in-tree
//! implementation, kept deliberately swappable.

use serde::{Deserialize, Serialize};

const DIGITS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

fn base() -> i32 {
    DIGITS.len() as i32
}

/// A totally-ordered, densely-between-generable key positioning a child
/// within a list or tree's sibling set. Ordering is plain lexicographic
/// byte comparison; keys are stable across persistence round-trips since
/// they are just strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderKey(String);

impl OrderKey {
    pub fn new(raw: impl Into<String>) -> Self {
        OrderKey(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Capability contract: generate a key strictly between `left` and
/// `right` (either bound may be absent, meaning unbounded on that side).
pub trait OrderKeyGenerator: Send + Sync {
    fn between(&self, left: Option<&OrderKey>, right: Option<&OrderKey>) -> OrderKey;
}

/// Default `OrderKeyGenerator`: base-62 fractional indexing, the same
/// family of algorithm used by collaborative list/outline editors.
///
/// Keys never carry a trailing "digit zero" character (the generator
/// trims it before returning), which keeps plain lexicographic string
/// comparison consistent with numeric "between" semantics: a shorter key
/// that is a prefix of a longer one always sorts first, exactly as a
/// fraction padded with trailing zeros would.
#[derive(Debug, Default, Clone, Copy)]
pub struct FractionalIndexGenerator;

fn digit_value(c: u8) -> i32 {
    DIGITS.iter().position(|&d| d == c).expect("invalid order-key digit") as i32
}

fn to_digits(s: &str) -> Vec<i32> {
    s.bytes().map(digit_value).collect()
}

/// Build a key strictly between `lo` (exclusive, `None` = unbounded
/// below) and `hi` (exclusive, `None` = unbounded above). Requires
/// `lo < hi` lexicographically when both are present.
fn key_between(lo: Option<&[i32]>, hi: Option<&[i32]>) -> String {
    let lo = lo.unwrap_or(&[]);
    let mut result: Vec<u8> = Vec::new();
    let mut i = 0usize;
    // `a` tracks the still-binding lower bound digit sequence; once we
    // diverge strictly above it we stop needing it (represented by
    // switching to the unbounded-below regime for remaining positions).
    let mut lower_binding = true;
    let mut upper_binding = true;

    loop {
        let a: i32 = if lower_binding && i < lo.len() {
            lo[i]
        } else {
            -1
        };
        let b: i32 = if upper_binding {
            match hi {
                Some(d) if i < d.len() => d[i],
                Some(_) => base(), // hi exhausted: no further upper constraint
                None => base(),
            }
        } else {
            base()
        };

        if b - a >= 2 {
            let digit = a + (b - a) / 2;
            result.push(DIGITS[digit as usize]);
            break;
        }

        // b == a + 1: no room at this position. Pick one side to match
        // exactly and carry its constraint one level deeper; the other
        // side's constraint is already satisfied by the strict digit
        // inequality at this position.
        if a >= 0 {
            result.push(DIGITS[a as usize]);
            upper_binding = false; // digit < b already, hi satisfied forever
            i += 1;
        } else {
            // a == -1, b == 0: only digit 0 keeps us <= hi here.
            result.push(DIGITS[0]);
            lower_binding = false; // we're past lo entirely; always true here
            i += 1;
        }
    }

    // Trim a trailing "digit zero" so prefix-based comparisons behave.
    while result.len() > 1 && *result.last().unwrap() == DIGITS[0] {
        result.pop();
    }
    String::from_utf8(result).expect("order key digits are ascii")
}

impl OrderKeyGenerator for FractionalIndexGenerator {
    fn between(&self, left: Option<&OrderKey>, right: Option<&OrderKey>) -> OrderKey {
        if let (Some(l), Some(r)) = (left, right) {
            debug_assert!(l < r, "between() requires left < right, got {:?} >= {:?}", l, r);
        }
        let lo_digits = left.map(|k| to_digits(k.as_str()));
        let hi_digits = right.map(|k| to_digits(k.as_str()));
        OrderKey::new(key_between(lo_digits.as_deref(), hi_digits.as_deref()))
    }
}
