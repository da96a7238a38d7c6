use crate::{
    bindings::{Binding, Bindings, is_variable_name},
    error::Error,
    value::{HasherHandle, Value},
};

/// Wire tag opening a splat input clause.
pub const SPLAT_TAG: &str = "::splat";

///
/// InClause
///
/// One query input clause: a single variable, a positional tuple, or a splat
/// producing one binding per element of an iterable argument.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InClause {
    Var(String),
    Tuple(Vec<InClause>),
    Splat(Box<InClause>),
}

impl InClause {
    /// Single-variable clause; the `?` sigil is added when absent.
    #[must_use]
    pub fn var(name: &str) -> Self {
        Self::Var(crate::pattern::variable(name))
    }

    /// Positional tuple clause.
    #[must_use]
    pub fn tuple<I: IntoIterator<Item = Self>>(clauses: I) -> Self {
        Self::Tuple(clauses.into_iter().collect())
    }

    /// Splat clause: one binding per element of the argument.
    #[must_use]
    pub fn splat(inner: Self) -> Self {
        Self::Splat(Box::new(inner))
    }

    /// Serialize into the value wire form.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        match self {
            Self::Var(name) => Value::Text(name.clone()),
            Self::Tuple(clauses) => {
                Value::List(clauses.iter().map(Self::to_wire).collect())
            }
            Self::Splat(inner) => Value::List(vec![
                Value::Text(SPLAT_TAG.to_string()),
                inner.to_wire(),
            ]),
        }
    }

    /// Parse the value wire form back into a clause.
    pub fn parse(value: &Value) -> Result<Self, Error> {
        match value {
            Value::Text(name) if is_variable_name(name) => Ok(Self::Var(name.clone())),
            Value::List(items) => {
                if let Some(Value::Text(tag)) = items.first()
                    && tag == SPLAT_TAG
                {
                    if items.len() != 2 {
                        return Err(Error::invalid_pattern(
                            "splat clause takes exactly one sub-clause",
                        ));
                    }
                    return Ok(Self::Splat(Box::new(Self::parse(&items[1])?)));
                }
                Ok(Self::Tuple(
                    items.iter().map(Self::parse).collect::<Result<_, _>>()?,
                ))
            }
            other => Err(Error::invalid_pattern(format!(
                "input clause must be a variable or a clause list, got {}",
                other.canonical_tag().label()
            ))),
        }
    }
}

/// Destructure query arguments into the initial bindings set: the cartesian
/// product across clauses, with conflicting combinations unified away.
pub fn parse_inputs(
    clauses: &[InClause],
    args: &[Value],
    hasher: &HasherHandle,
) -> Result<Bindings, Error> {
    if clauses.len() != args.len() {
        return Err(Error::shape_mismatch(format!(
            "query takes {} input(s), got {}",
            clauses.len(),
            args.len()
        )));
    }

    let mut combined = vec![Binding::new()];
    for (clause, arg) in clauses.iter().zip(args.iter()) {
        let alternatives = clause_alternatives(clause, arg)?;
        let mut next = Vec::with_capacity(combined.len() * alternatives.len());
        for base in &combined {
            for alternative in &alternatives {
                if let Some(merged) = unify(base, alternative) {
                    next.push(merged);
                }
            }
        }
        combined = next;
    }

    let mut out = Bindings::with_hasher(hasher.clone());
    for record in combined {
        out.add(record)?;
    }
    Ok(out)
}

fn clause_alternatives(clause: &InClause, arg: &Value) -> Result<Vec<Binding>, Error> {
    match clause {
        InClause::Var(name) => Ok(vec![Binding::new().bind(name.clone(), arg.clone())]),
        InClause::Tuple(clauses) => {
            let Some(items) = arg.as_list() else {
                return Err(Error::shape_mismatch(
                    "tuple input clause expects an array argument",
                ));
            };
            if items.len() < clauses.len() {
                return Err(Error::shape_mismatch(format!(
                    "tuple input clause expects at least {} element(s), got {}",
                    clauses.len(),
                    items.len()
                )));
            }

            let mut combined = vec![Binding::new()];
            for (inner, item) in clauses.iter().zip(items.iter()) {
                let alternatives = clause_alternatives(inner, item)?;
                let mut next = Vec::new();
                for base in &combined {
                    for alternative in &alternatives {
                        if let Some(merged) = unify(base, alternative) {
                            next.push(merged);
                        }
                    }
                }
                combined = next;
            }
            Ok(combined)
        }
        InClause::Splat(inner) => {
            let Some(items) = arg.as_list() else {
                return Err(Error::shape_mismatch(
                    "splat input clause expects an array argument",
                ));
            };

            let mut out = Vec::new();
            for item in items {
                out.extend(clause_alternatives(inner, item)?);
            }
            Ok(out)
        }
    }
}

// Merge two records; None when they disagree on a shared variable.
fn unify(left: &Binding, right: &Binding) -> Option<Binding> {
    let mut merged = left.clone();
    for (var, value) in right.iter() {
        match merged.get(var) {
            Some(existing) if existing != value => return None,
            _ => {
                merged.insert_var(var.clone(), value.clone());
            }
        }
    }
    Some(merged)
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::default_hasher;

    fn run(clauses: &[InClause], args: &[Value]) -> Result<Bindings, Error> {
        parse_inputs(clauses, args, &default_hasher())
    }

    #[test]
    fn single_variable_binds_the_argument() {
        let out = run(&[InClause::var("x")], &[Value::Int(1)]).expect("parse");
        assert_eq!(out.len(), 1);
        let (record, _) = out.iter().next().expect("record");
        assert_eq!(record.get("?x"), Some(&Value::Int(1)));
    }

    #[test]
    fn tuple_binds_positionally() {
        let clause = InClause::tuple([InClause::var("a"), InClause::var("b")]);
        let arg = Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        let out = run(&[clause], &[arg]).expect("parse");
        let (record, _) = out.iter().next().expect("record");
        assert_eq!(record.get("?a"), Some(&Value::Int(1)));
        assert_eq!(record.get("?b"), Some(&Value::Int(2)));
    }

    #[test]
    fn tuple_rejects_scalar_arguments() {
        let clause = InClause::tuple([InClause::var("a")]);
        let err = run(&[clause], &[Value::Int(1)]).expect_err("must reject");
        assert!(err.is(crate::error::ErrorKind::ShapeMismatch));
    }

    #[test]
    fn splat_produces_one_binding_per_element() {
        let clause = InClause::splat(InClause::var("x"));
        let arg = Value::List(vec![Value::Int(1), Value::Int(2)]);
        let out = run(&[clause], &[arg]).expect("parse");
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn clauses_combine_as_a_cartesian_product() {
        let clauses = [
            InClause::splat(InClause::var("x")),
            InClause::splat(InClause::var("y")),
        ];
        let args = [
            Value::List(vec![Value::Int(1), Value::Int(2)]),
            Value::List(vec![Value::Int(10), Value::Int(20)]),
        ];
        let out = run(&clauses, &args).expect("parse");
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn wire_round_trip() {
        let clause = InClause::splat(InClause::tuple([InClause::var("a"), InClause::var("b")]));
        let wire = clause.to_wire();
        assert_eq!(InClause::parse(&wire).expect("parse"), clause);
    }
}
