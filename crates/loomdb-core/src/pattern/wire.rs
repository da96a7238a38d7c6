use crate::{
    bindings::is_variable_name,
    error::Error,
    pattern::{MAYBE_TAG, NOT_TAG, OR_TAG, Pattern, PatternKey, TUPLE_TAG},
    value::Value,
};

/// Serialize a pattern into its value wire form.
///
/// Test predicates are opaque functions and do not serialize.
pub fn pattern_to_value(pattern: &Pattern) -> Result<Value, Error> {
    match pattern {
        Pattern::Variable(name) => Ok(Value::Text(name.clone())),
        Pattern::Scalar(value) => Ok(value.clone()),
        Pattern::Null => Ok(Value::Null),
        Pattern::Object(entries) => {
            let mut map = std::collections::BTreeMap::new();
            for (key, sub) in entries {
                map.insert(key.to_wire(), pattern_to_value(sub)?);
            }
            Ok(Value::Map(map))
        }
        Pattern::Each(elements) => Ok(Value::List(
            elements
                .iter()
                .map(pattern_to_value)
                .collect::<Result<_, _>>()?,
        )),
        Pattern::Tuple(elements) => tagged(TUPLE_TAG, elements),
        Pattern::Or(alternatives) => tagged(OR_TAG, alternatives),
        Pattern::Not(inner) => tagged(NOT_TAG, std::slice::from_ref(&**inner)),
        Pattern::Maybe(inner) => tagged(MAYBE_TAG, std::slice::from_ref(&**inner)),
        Pattern::Test(predicate) => Err(Error::unsupported(format!(
            "test predicate '{}' cannot be serialized",
            predicate.name()
        ))),
    }
}

fn tagged(tag: &str, children: &[Pattern]) -> Result<Value, Error> {
    let mut items = Vec::with_capacity(children.len() + 1);
    items.push(Value::Text(tag.to_string()));
    for child in children {
        items.push(pattern_to_value(child)?);
    }
    Ok(Value::List(items))
}

/// Parse a value wire form back into a pattern.
///
/// Unknown modifier tags and malformed modifier arities are structural
/// pattern errors.
pub fn parse_pattern(value: &Value) -> Result<Pattern, Error> {
    match value {
        Value::Text(s) if is_variable_name(s) => Ok(Pattern::Variable(s.clone())),
        Value::Null => Ok(Pattern::Null),
        Value::Map(entries) => {
            let mut out = Vec::with_capacity(entries.len());
            for (key, sub) in entries {
                out.push((PatternKey::classify(key), parse_pattern(sub)?));
            }
            Ok(Pattern::Object(out))
        }
        Value::List(items) => parse_list(items),
        scalar => Ok(Pattern::Scalar(scalar.clone())),
    }
}

fn parse_list(items: &[Value]) -> Result<Pattern, Error> {
    if let Some(Value::Text(tag)) = items.first()
        && tag.starts_with("::")
    {
        let children: Vec<Pattern> = items[1..]
            .iter()
            .map(parse_pattern)
            .collect::<Result<_, _>>()?;

        return match tag.as_str() {
            TUPLE_TAG => Ok(Pattern::Tuple(children)),
            OR_TAG => Ok(Pattern::Or(children)),
            NOT_TAG => single_child(children, NOT_TAG).map(|p| Pattern::Not(Box::new(p))),
            MAYBE_TAG => single_child(children, MAYBE_TAG).map(|p| Pattern::Maybe(Box::new(p))),
            other => Err(Error::invalid_pattern(format!(
                "unknown modifier tag '{other}'"
            ))),
        };
    }

    Ok(Pattern::Each(
        items.iter().map(parse_pattern).collect::<Result<_, _>>()?,
    ))
}

fn single_child(mut children: Vec<Pattern>, tag: &str) -> Result<Pattern, Error> {
    if children.len() != 1 {
        return Err(Error::invalid_pattern(format!(
            "modifier '{tag}' takes exactly one sub-pattern, got {}",
            children.len()
        )));
    }
    Ok(children.remove(0))
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{maybe, not, obj, or, test, tuple, var};

    #[test]
    fn round_trip_preserves_structure() {
        let pattern = obj([
            ("id", var("id")),
            ("?status", Pattern::from("completed")),
            ("tags", or([Pattern::from("a"), Pattern::from("b")])),
            ("rank", tuple([var("head"), Pattern::from(1i64)])),
            ("archived", not(Pattern::from(true))),
            ("nick", maybe(var("nick"))),
        ]);

        let wire = pattern_to_value(&pattern).expect("serialize");
        let parsed = parse_pattern(&wire).expect("parse");
        let rewired = pattern_to_value(&parsed).expect("serialize again");
        assert_eq!(wire, rewired, "wire form must be a fixed point of parsing");
    }

    #[test]
    fn unknown_modifier_tag_is_rejected() {
        let wire = Value::List(vec![Value::Text("::xor".to_string())]);
        let err = parse_pattern(&wire).expect_err("must reject");
        assert!(err.is(crate::error::ErrorKind::InvalidPattern));
    }

    #[test]
    fn not_requires_exactly_one_child() {
        let wire = Value::List(vec![
            Value::Text(NOT_TAG.to_string()),
            Value::Int(1),
            Value::Int(2),
        ]);
        assert!(parse_pattern(&wire).is_err());
    }

    #[test]
    fn test_predicates_do_not_serialize() {
        let pattern = test("always", |_| true);
        let err = pattern_to_value(&pattern).expect_err("must reject");
        assert!(err.is(crate::error::ErrorKind::Unsupported));
    }

    #[test]
    fn plain_arrays_parse_as_each() {
        let wire = Value::List(vec![Value::Text("?x".to_string())]);
        assert!(matches!(
            parse_pattern(&wire).expect("parse"),
            Pattern::Each(elements) if elements.len() == 1
        ));
    }
}
