use crate::{
    bindings::Bindings,
    error::Error,
    pattern::match_pattern,
    query::{CompiledQuery, QueryOptions, ResultSet, ReturnTerm, aggregate, input::parse_inputs},
    value::{Digest, HasherHandle, Value, default_hasher},
};
use std::collections::BTreeMap;

/// Execute a compiled query against an entity list.
///
/// Execution folds the matcher over the entities, grouping and aggregating
/// the produced bindings, then shapes rows deterministically by canonical
/// hash before applying offset/limit.
pub fn run_query(
    compiled: &CompiledQuery,
    entities: &[Value],
    args: &[Value],
    options: &QueryOptions,
) -> Result<ResultSet, Error> {
    let hasher = options.hasher.clone().unwrap_or_else(default_hasher);
    let initial = parse_inputs(&compiled.inputs, args, &hasher)?;

    let mut matched = Bindings::with_hasher(hasher.clone());
    for entity in entities {
        matched = matched.merge(&match_pattern(&compiled.clause, Some(entity), &initial)?);
    }

    build_result(compiled, &matched, options, &hasher)
}

fn build_result(
    compiled: &CompiledQuery,
    matched: &Bindings,
    options: &QueryOptions,
    hasher: &HasherHandle,
) -> Result<ResultSet, Error> {
    let terms = compiled.find.terms();
    let single = compiled.find.is_single();
    let vars: Vec<String> = terms
        .iter()
        .filter_map(|term| match term {
            ReturnTerm::Var(name) => Some(name.clone()),
            ReturnTerm::Aggregate(..) => None,
        })
        .collect();
    let has_aggregates = terms.iter().any(ReturnTerm::is_aggregate);

    // Content-addressed rows: dedup and canonical ordering in one pass.
    let mut rows: BTreeMap<Digest, Value> = BTreeMap::new();

    if has_aggregates {
        for group in matched.group_by(&vars)? {
            let Some((sample, _)) = group.iter().next() else {
                continue;
            };

            let mut cells = Vec::with_capacity(terms.len());
            for term in &terms {
                match term {
                    ReturnTerm::Var(name) => {
                        cells.push(sample.get(name).cloned().unwrap_or(Value::Null));
                    }
                    ReturnTerm::Aggregate(kind, var) => {
                        cells.push(aggregate::compute(*kind, var, &group, hasher)?);
                    }
                }
            }
            let row = shape_row(cells, single);
            rows.insert(hasher.digest(&row)?, row);
        }
    } else {
        for (record, _) in matched.iter() {
            let cells: Vec<Value> = vars
                .iter()
                .map(|name| record.get(name).cloned().unwrap_or(Value::Null))
                .collect();
            let row = shape_row(cells, single);
            rows.insert(hasher.digest(&row)?, row);
        }
    }

    let all: Vec<Value> = rows.into_values().collect();
    let size = all.len();

    #[expect(clippy::cast_possible_truncation)]
    let offset = options.offset.unwrap_or(compiled.offset) as usize;
    #[expect(clippy::cast_possible_truncation)]
    let limit = options
        .limit
        .or(compiled.limit)
        .map_or(usize::MAX, |l| l as usize);

    let shaped: Vec<Value> = all.into_iter().skip(offset).take(limit).collect();
    let count = shaped.len();

    Ok(ResultSet {
        result: Value::List(shaped),
        size,
        count,
        offset,
    })
}

fn shape_row(mut cells: Vec<Value>, single: bool) -> Value {
    if single {
        cells.pop().unwrap_or(Value::Null)
    } else {
        Value::List(cells)
    }
}

///
/// TESTS
///
