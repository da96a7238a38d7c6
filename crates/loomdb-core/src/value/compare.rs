use crate::value::Value;
use std::cmp::Ordering;

/// Total canonical comparator used by result ordering and map-key surfaces.
///
/// Ordering rules:
/// 1. Canonical variant rank
/// 2. Variant-specific comparison for same-ranked values
///
/// Mixed-variant comparisons are rank-only and must remain deterministic.
#[must_use]
pub fn canonical_cmp(left: &Value, right: &Value) -> Ordering {
    let rank = left.canonical_rank().cmp(&right.canonical_rank());
    if rank != Ordering::Equal {
        return rank;
    }

    canonical_cmp_same_rank(left, right)
}

fn canonical_cmp_same_rank(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Float(a), Value::Float(b)) => a.cmp(b),
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Internal(a), Value::Internal(b)) => {
            a.tag.cmp(&b.tag).then_with(|| a.data.cmp(&b.data))
        }
        (Value::List(a), Value::List(b)) => canonical_cmp_list(a, b),
        (Value::Map(a), Value::Map(b)) => {
            for ((left_key, left_value), (right_key, right_value)) in a.iter().zip(b.iter()) {
                let key_cmp = left_key.cmp(right_key);
                if key_cmp != Ordering::Equal {
                    return key_cmp;
                }

                let value_cmp = canonical_cmp(left_value, right_value);
                if value_cmp != Ordering::Equal {
                    return value_cmp;
                }
            }
            a.len().cmp(&b.len())
        }
        (Value::Ref(a), Value::Ref(b)) => a.kind().cmp(&b.kind()).then_with(|| a.id().cmp(b.id())),
        (Value::Text(a), Value::Text(b)) => a.cmp(b),
        (Value::Uint(a), Value::Uint(b)) => a.cmp(b),
        _ => Ordering::Equal,
    }
}

fn canonical_cmp_list(left: &[Value], right: &[Value]) -> Ordering {
    for (left, right) in left.iter().zip(right.iter()) {
        let cmp = canonical_cmp(left, right);
        if cmp != Ordering::Equal {
            return cmp;
        }
    }

    left.len().cmp(&right.len())
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refs::Reference;

    #[test]
    fn mixed_variants_order_by_rank() {
        assert_eq!(
            canonical_cmp(&Value::Bool(true), &Value::Int(0)),
            Ordering::Less
        );
        assert_eq!(
            canonical_cmp(&Value::Uint(1), &Value::Text("a".to_string())),
            Ordering::Greater
        );
    }

    #[test]
    fn list_ordering_is_elementwise_then_length() {
        let a = Value::List(vec![Value::Int(1)]);
        let b = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(canonical_cmp(&a, &b), Ordering::Less);
    }

    #[test]
    fn refs_order_by_kind_then_id() {
        let a = Value::Ref(Reference::entity("a"));
        let b = Value::Ref(Reference::tombstone("a"));
        assert_ne!(canonical_cmp(&a, &b), Ordering::Equal);
    }
}
