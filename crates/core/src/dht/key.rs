#![warn(missing_docs)]
//! Keys of the ring and the interval predicate that drives all routing.
//!
//! A [Key] is an integer in `[0, 2^M)` obtained by hashing a string. Node
//! ids hash the node's `address:port` string, mailbox keys hash the owner
//! address. The hash is a truncation of SHA-1 that is observable on the wire
//! (ids are exchanged between peers and baked into dump files), so it must
//! be reproduced bit for bit: the digest is read in strides of four bytes,
//! each stride's leading byte is formatted in decimal, the decimal strings
//! are concatenated and the result is parsed as a signed 64-bit integer,
//! then reduced modulo `2^M`.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use sha1::Digest;
use sha1::Sha1;

use crate::consts::RING_MOD;

/// A position on the ring, in `[0, 2^M)`.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Key(u64);

impl Key {
    /// Hash a string into the key space.
    pub fn hash(s: &str) -> Self {
        Key((digest_decimal(s) as u64) % RING_MOD)
    }

    /// The raw position.
    pub const fn value(self) -> u64 {
        self.0
    }

    /// The key `(self + 2^exp) mod 2^M`, the start of the arc covered by
    /// finger `exp`.
    pub fn finger_offset(self, exp: u32) -> Key {
        Key((self.0 + (1u64 << exp)) % RING_MOD)
    }
}

/// The decimal-concatenation SHA-1 digest shared by node ids and password
/// hashes. Every fourth digest byte is written in decimal and the
/// concatenation is read back as one integer; five bytes of at most three
/// digits each always fit in an i64.
pub(crate) fn digest_decimal(s: &str) -> i64 {
    let digest = Sha1::digest(s.as_bytes());
    let mut acc: i64 = 0;
    for i in (0..digest.len()).step_by(4) {
        let byte = i64::from(digest[i]);
        let shift = if byte >= 100 {
            1000
        } else if byte >= 10 {
            100
        } else {
            10
        };
        acc = acc * shift + byte;
    }
    acc
}

/// Test whether `key` lies on the clockwise arc `(lhs, rhs]`.
///
/// The second clause handles the junction of the ring: when `lhs > rhs` the
/// arc crosses zero, and keys above the junction or below `rhs` both fall on
/// `rhs`'s side.
pub fn between(key: Key, lhs: Key, rhs: Key) -> bool {
    (key > lhs && (key <= rhs || lhs > rhs)) || (key <= rhs && key < lhs && rhs < lhs)
}

impl From<u64> for Key {
    fn from(raw: u64) -> Self {
        Key(raw % RING_MOD)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Key({})", self.0)
    }
}
