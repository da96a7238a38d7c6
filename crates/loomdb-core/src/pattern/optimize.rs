use crate::{
    pattern::Pattern,
    value::Value,
};

// Key-priority buckets: cheap and most-constraining sub-patterns first.
// Reordering is a performance heuristic only; the produced bindings must be
// identical for any entry order.
const PRIORITY_NULL: u8 = 0;
const PRIORITY_BOOL: u8 = 1;
const PRIORITY_NUMBER: u8 = 2;
const PRIORITY_OPAQUE: u8 = 3;
const PRIORITY_TEXT: u8 = 4;
const PRIORITY_VARIABLE: u8 = 5;
const PRIORITY_NOT: u8 = 6;
const PRIORITY_OBJECT: u8 = 7;
const PRIORITY_TUPLE: u8 = 8;
const PRIORITY_OR: u8 = 9;
const PRIORITY_ARRAY: u8 = 10;
const PRIORITY_MAYBE: u8 = 11;

#[must_use]
const fn priority(pattern: &Pattern) -> u8 {
    match pattern {
        Pattern::Null => PRIORITY_NULL,
        Pattern::Scalar(value) => match value {
            Value::Null => PRIORITY_NULL,
            Value::Bool(_) => PRIORITY_BOOL,
            Value::Float(_) | Value::Int(_) | Value::Uint(_) => PRIORITY_NUMBER,
            Value::Internal(_) | Value::Ref(_) => PRIORITY_OPAQUE,
            Value::Text(_) | Value::List(_) | Value::Map(_) => PRIORITY_TEXT,
        },
        Pattern::Variable(_) => PRIORITY_VARIABLE,
        Pattern::Not(_) => PRIORITY_NOT,
        Pattern::Object(_) => PRIORITY_OBJECT,
        Pattern::Tuple(_) => PRIORITY_TUPLE,
        Pattern::Or(_) => PRIORITY_OR,
        Pattern::Each(_) | Pattern::Test(_) => PRIORITY_ARRAY,
        Pattern::Maybe(_) => PRIORITY_MAYBE,
    }
}

/// Recursively reorder object-pattern entries by sub-pattern priority.
///
/// The sort is stable, so equal-priority entries keep their authored order.
#[must_use]
pub fn optimize(pattern: Pattern) -> Pattern {
    match pattern {
        Pattern::Object(mut entries) => {
            entries = entries
                .into_iter()
                .map(|(key, sub)| (key, optimize(sub)))
                .collect();
            entries.sort_by_key(|(_, sub)| priority(sub));
            Pattern::Object(entries)
        }
        Pattern::Each(elements) => {
            Pattern::Each(elements.into_iter().map(optimize).collect())
        }
        Pattern::Tuple(elements) => {
            Pattern::Tuple(elements.into_iter().map(optimize).collect())
        }
        Pattern::Or(alternatives) => {
            Pattern::Or(alternatives.into_iter().map(optimize).collect())
        }
        Pattern::Not(inner) => Pattern::Not(Box::new(optimize(*inner))),
        Pattern::Maybe(inner) => Pattern::Maybe(Box::new(optimize(*inner))),
        leaf @ (Pattern::Null
        | Pattern::Scalar(_)
        | Pattern::Test(_)
        | Pattern::Variable(_)) => leaf,
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{obj, var};

    fn keys(pattern: &Pattern) -> Vec<String> {
        match pattern {
            Pattern::Object(entries) => entries.iter().map(|(k, _)| k.to_wire()).collect(),
            _ => Vec::new(),
        }
    }

    #[test]
    fn scalars_sort_before_variables_and_modifiers() {
        let pattern = obj([
            ("deep", obj([("x", var("x"))])),
            ("name", var("name")),
            ("flag", Pattern::from(true)),
            ("status", Pattern::from("done")),
        ]);

        let optimized = optimize(pattern);
        assert_eq!(keys(&optimized), vec!["flag", "status", "name", "deep"]);
    }

    #[test]
    fn stable_sort_preserves_authored_order_within_a_bucket() {
        let pattern = obj([
            ("b", Pattern::from("y")),
            ("a", Pattern::from("x")),
        ]);
        let optimized = optimize(pattern);
        assert_eq!(keys(&optimized), vec!["b", "a"]);
    }

    #[test]
    fn nested_objects_are_reordered_too() {
        let pattern = obj([(
            "inner",
            obj([("v", var("v")), ("s", Pattern::from("lit"))]),
        )]);
        let optimized = optimize(pattern);
        let Pattern::Object(entries) = &optimized else {
            panic!("expected object");
        };
        let (_, inner) = &entries[0];
        assert_eq!(keys(inner), vec!["s", "v"]);
    }
}
