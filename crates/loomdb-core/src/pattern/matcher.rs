use crate::{
    bindings::Bindings,
    error::Error,
    pattern::{Pattern, PatternKey},
    value::Value,
};

/// Unify a pattern against a value under an incoming bindings set.
///
/// Returns a possibly-larger bindings set; an empty set is the "no match"
/// signal. The matcher only fails on structurally malformed patterns or
/// hashing errors, never on semantic mismatch.
pub fn match_pattern(
    pattern: &Pattern,
    value: Option<&Value>,
    bindings: &Bindings,
) -> Result<Bindings, Error> {
    match pattern {
        Pattern::Variable(name) => match_variable(name, value, bindings),
        Pattern::Scalar(expected) => Ok(match value {
            Some(v) if v == expected => bindings.clone(),
            _ => bindings.like(),
        }),
        Pattern::Null => Ok(match value {
            None | Some(Value::Null) => bindings.clone(),
            Some(_) => bindings.like(),
        }),
        Pattern::Test(predicate) => {
            Ok(bindings.filter(|record, _| predicate.check(record)))
        }
        Pattern::Object(entries) => match_object(entries, value, bindings),
        Pattern::Each(elements) => match_each(elements, pattern, value, bindings),
        Pattern::Tuple(elements) => match_tuple(elements, value, bindings),
        Pattern::Or(alternatives) => {
            let mut out = bindings.like();
            for alternative in alternatives {
                out = out.merge(&match_pattern(alternative, value, bindings)?);
            }
            Ok(out)
        }
        Pattern::Not(inner) => match_not(inner, value, bindings),
        Pattern::Maybe(inner) => {
            // Inner OR pass-through: never reduces the incoming set.
            Ok(match_pattern(inner, value, bindings)?.merge(bindings))
        }
    }
}

fn match_variable(
    name: &str,
    value: Option<&Value>,
    bindings: &Bindings,
) -> Result<Bindings, Error> {
    let Some(value) = value else {
        return Ok(bindings.like());
    };

    let mut out = bindings.like();
    for (record, count) in bindings.iter() {
        match record.get(name) {
            Some(bound) if bound == value => out.add_counted(record.clone(), count)?,
            Some(_) => {}
            None => {
                out.add_counted(record.clone().bind(name, value.clone()), count)?;
            }
        }
    }
    Ok(out)
}

// A literal key may be absent from the value map only when its sub-pattern
// tolerates absence.
fn tolerates_absent(pattern: &Pattern) -> bool {
    match pattern {
        Pattern::Null | Pattern::Maybe(_) | Pattern::Not(_) => true,
        Pattern::Each(elements) => elements.is_empty(),
        _ => false,
    }
}

fn match_object(
    entries: &[(PatternKey, Pattern)],
    value: Option<&Value>,
    bindings: &Bindings,
) -> Result<Bindings, Error> {
    let Some(value) = value else {
        return Ok(bindings.like());
    };

    // An object pattern distributes over array values.
    if let Value::List(items) = value {
        let mut out = bindings.like();
        for item in items {
            out = out.merge(&match_object(entries, Some(item), bindings)?);
        }
        return Ok(out);
    }

    let Value::Map(map) = value else {
        return Ok(bindings.like());
    };

    let mut acc = bindings.clone();
    for (key, sub) in entries {
        if acc.is_empty() {
            break;
        }

        acc = match key {
            PatternKey::Literal(k) => match map.get(k) {
                Some(v) => match_pattern(sub, Some(v), &acc)?,
                None if tolerates_absent(sub) => match_pattern(sub, None, &acc)?,
                None => acc.like(),
            },
            PatternKey::Variable(key_var) => {
                let mut out = acc.like();
                for (key_name, v) in map {
                    let key_value = Value::Text(key_name.clone());
                    let with_key = match_variable(key_var, Some(&key_value), &acc)?;
                    if with_key.is_empty() {
                        continue;
                    }
                    out = out.merge(&match_pattern(sub, Some(v), &with_key)?);
                }
                out
            }
            PatternKey::Splice(_) => match_pattern(sub, Some(value), &acc)?,
        };
    }

    Ok(acc)
}

fn match_each(
    elements: &[Pattern],
    whole: &Pattern,
    value: Option<&Value>,
    bindings: &Bindings,
) -> Result<Bindings, Error> {
    match value {
        // Distribute the whole array pattern over array elements.
        Some(Value::List(items)) => {
            let mut out = bindings.like();
            for item in items {
                out = out.merge(&match_pattern(whole, Some(item), bindings)?);
            }
            Ok(out)
        }
        // Elements-as-predicates: conjunction against the same value.
        Some(scalar) => {
            let mut acc = bindings.clone();
            for element in elements {
                if acc.is_empty() {
                    break;
                }
                acc = match_pattern(element, Some(scalar), &acc)?;
            }
            Ok(acc)
        }
        None => Ok(if elements.is_empty() {
            bindings.clone()
        } else {
            bindings.like()
        }),
    }
}

fn match_tuple(
    elements: &[Pattern],
    value: Option<&Value>,
    bindings: &Bindings,
) -> Result<Bindings, Error> {
    let Some(Value::List(items)) = value else {
        return Ok(bindings.like());
    };
    if items.len() < elements.len() {
        return Ok(bindings.like());
    }

    // Positional; trailing value elements are ignored.
    let mut acc = bindings.clone();
    for (element, item) in elements.iter().zip(items.iter()) {
        if acc.is_empty() {
            break;
        }
        acc = match_pattern(element, Some(item), &acc)?;
    }
    Ok(acc)
}

fn match_not(
    inner: &Pattern,
    value: Option<&Value>,
    bindings: &Bindings,
) -> Result<Bindings, Error> {
    if value.is_none() {
        return Ok(bindings.clone());
    }

    let mut out = bindings.like();
    for (record, count) in bindings.iter() {
        let mut single = bindings.like();
        single.add(record.clone())?;
        if match_pattern(inner, value, &single)?.is_empty() {
            out.add_counted(record.clone(), count)?;
        }
    }
    Ok(out)
}

///
/// TESTS
///
