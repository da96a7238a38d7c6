use crate::{error::Error, value::Value};
use std::sync::Arc;
use xxhash_rust::xxh3::Xxh3;

/// Value-hash format version byte used by canonical digest encoding.
pub(crate) const VALUE_HASH_VERSION: u8 = 1;

/// Stable XXH3 seed used by canonical value hashing across releases.
pub(crate) const VALUE_HASH_SEED: u64 = 0;

///
/// Digest
///
/// Canonical fixed-width content digest. Equal iff the hashed values are
/// structurally equal after map-key ordering and reference normalization.
///

pub type Digest = u128;

/// Derive one stable 64-bit hash from the canonical value digest.
#[must_use]
pub const fn stable_hash(digest: Digest) -> u64 {
    (digest >> 64) as u64
}

///
/// ValueHasher
///
/// Injectable canonical hashing seam. The contract is structural equality and
/// run-to-run stability, not cryptographic strength.
///

pub trait ValueHasher: Send + Sync {
    fn digest(&self, value: &Value) -> Result<Digest, Error>;
}

/// Shared handle to a canonical hasher implementation.
pub type HasherHandle = Arc<dyn ValueHasher>;

/// Build the default XXH3-backed hasher handle.
#[must_use]
pub fn default_hasher() -> HasherHandle {
    Arc::new(Xxh3ValueHasher)
}

///
/// Xxh3ValueHasher
///
/// Default canonical hasher: XXH3-128 over the tag-prefixed, length-framed
/// encoding below.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct Xxh3ValueHasher;

impl ValueHasher for Xxh3ValueHasher {
    fn digest(&self, value: &Value) -> Result<Digest, Error> {
        hash_value(value)
    }
}

fn feed_u8(h: &mut Xxh3, x: u8) {
    h.update(&[x]);
}
fn feed_u32(h: &mut Xxh3, x: u32) {
    h.update(&x.to_be_bytes());
}
fn feed_u64(h: &mut Xxh3, x: u64) {
    h.update(&x.to_be_bytes());
}
fn feed_i64(h: &mut Xxh3, x: i64) {
    h.update(&x.to_be_bytes());
}
fn feed_bytes(h: &mut Xxh3, b: &[u8]) {
    h.update(b);
}

#[expect(clippy::cast_possible_truncation)]
fn write_to_hasher(value: &Value, h: &mut Xxh3) -> Result<(), Error> {
    feed_u8(h, value.canonical_tag().to_u8());

    match value {
        Value::Bool(b) => {
            feed_u8(h, u8::from(*b));
        }
        Value::Float(v) => {
            feed_bytes(h, &v.to_be_bytes());
        }
        Value::Int(i) => {
            feed_i64(h, *i);
        }
        Value::Internal(v) => {
            feed_u32(h, v.tag.len() as u32);
            feed_bytes(h, v.tag.as_bytes());
            feed_u32(h, v.data.len() as u32);
            feed_bytes(h, &v.data);
        }
        Value::List(xs) => {
            feed_u32(h, xs.len() as u32);
            for x in xs {
                feed_u8(h, 0xFF);
                write_to_hasher(x, h)?; // recurse, no sub-hash
            }
        }
        Value::Map(entries) => {
            // BTreeMap iteration is already canonical key order.
            feed_u32(h, entries.len() as u32);
            for (key, value) in entries {
                feed_u8(h, 0xFD);
                feed_u32(h, key.len() as u32);
                feed_bytes(h, key.as_bytes());
                feed_u8(h, 0xFE);
                write_to_hasher(value, h)?;
            }
        }
        Value::Null => {
            // No additional payload beyond canonical tag.
        }
        Value::Ref(r) => {
            feed_u8(h, r.kind().to_u8());
            feed_u32(h, r.id().len() as u32);
            feed_bytes(h, r.id().as_bytes());
        }
        Value::Text(s) => {
            feed_u32(h, s.len() as u32);
            feed_bytes(h, s.as_bytes());
        }
        Value::Uint(u) => {
            feed_u64(h, *u);
        }
    }

    Ok(())
}

/// Stable hash used for canonical value fingerprinting across all layers.
pub fn hash_value(value: &Value) -> Result<Digest, Error> {
    let mut h = Xxh3::with_seed(VALUE_HASH_SEED);
    feed_u8(&mut h, VALUE_HASH_VERSION); // version

    write_to_hasher(value, &mut h)?;
    Ok(h.digest128())
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{refs::Reference, value::Float64};

    fn v_txt(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn hash_contract_seed_and_version_are_frozen() {
        assert_eq!(VALUE_HASH_SEED, 0);
        assert_eq!(VALUE_HASH_VERSION, 1);
    }

    #[test]
    fn hash_is_deterministic_for_same_value() {
        let v = Value::Int(42);
        let a = hash_value(&v).expect("hash value");
        let b = hash_value(&v).expect("hash value");
        assert_eq!(a, b, "hash should be deterministic for same value");
    }

    #[test]
    fn different_variants_produce_different_hashes() {
        let a = hash_value(&Value::Int(5)).expect("hash value");
        let b = hash_value(&Value::Uint(5)).expect("hash value");
        assert_ne!(
            a, b,
            "Int(5) and Uint(5) must hash differently (different tag)"
        );
    }

    #[test]
    fn map_hash_is_key_order_independent() {
        let left = Value::map_of([("z", Value::Uint(9)), ("a", Value::Uint(1))]);
        let right = Value::map_of([("a", Value::Uint(1)), ("z", Value::Uint(9))]);
        assert_eq!(
            hash_value(&left).expect("hash value"),
            hash_value(&right).expect("hash value"),
            "map hash must not depend on construction order",
        );
    }

    #[test]
    fn list_hash_is_order_sensitive() {
        let l1 = Value::List(vec![Value::Int(1), Value::Int(2)]);
        let l2 = Value::List(vec![Value::Int(2), Value::Int(1)]);
        assert_ne!(
            hash_value(&l1).expect("hash value"),
            hash_value(&l2).expect("hash value"),
            "list order should affect hash"
        );
    }

    #[test]
    fn list_hash_is_length_sensitive() {
        let l1 = Value::List(vec![Value::Int(1)]);
        let l2 = Value::List(vec![Value::Int(1), Value::Int(1)]);
        assert_ne!(
            hash_value(&l1).expect("hash value"),
            hash_value(&l2).expect("hash value"),
            "list length should affect hash"
        );
    }

    #[test]
    fn text_boundaries_are_length_framed() {
        let left = Value::List(vec![v_txt("ab"), v_txt("c")]);
        let right = Value::List(vec![v_txt("a"), v_txt("bc")]);
        assert_ne!(
            hash_value(&left).expect("hash value"),
            hash_value(&right).expect("hash value"),
            "text boundaries must be length-framed to avoid collisions"
        );
    }

    #[test]
    fn ref_hash_tracks_kind_and_id() {
        let entity = hash_value(&Value::Ref(Reference::entity("x"))).expect("hash value");
        let tombstone = hash_value(&Value::Ref(Reference::tombstone("x"))).expect("hash value");
        let other = hash_value(&Value::Ref(Reference::entity("y"))).expect("hash value");
        assert_ne!(entity, tombstone);
        assert_ne!(entity, other);
    }

    #[test]
    fn float_hash_canonicalizes_negative_zero() {
        let a = Value::Float(Float64::try_new(-0.0).expect("finite"));
        let b = Value::Float(Float64::try_new(0.0).expect("finite"));
        assert_eq!(
            hash_value(&a).expect("hash value"),
            hash_value(&b).expect("hash value"),
        );
    }

    #[test]
    fn stable_hash_uses_digest_prefix_contract() {
        let digest: Digest = 0x1122_3344_5566_7788_AABB_CCDD_EEF0_0A0B;
        assert_eq!(
            stable_hash(digest),
            0x1122_3344_5566_7788,
            "stable hash must use the canonical leading 64 bits of the value digest",
        );
    }
}
