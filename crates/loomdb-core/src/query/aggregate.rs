use crate::{
    bindings::Bindings,
    error::Error,
    value::{Digest, Float64, HasherHandle, Value},
};
use std::collections::BTreeMap;

///
/// AggregateKind
///
/// The recognized per-group aggregations. Numeric aggregations coerce their
/// inputs; non-numeric samples are skipped.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AggregateKind {
    Avg,
    Count,
    CountDistinct,
    Distinct,
    Max,
    Median,
    Min,
    Mode,
    Stddev,
    Sum,
    Variance,
}

impl AggregateKind {
    /// Stable aggregation name used by the wire form.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Avg => "avg",
            Self::Count => "count",
            Self::CountDistinct => "count-distinct",
            Self::Distinct => "distinct",
            Self::Max => "max",
            Self::Median => "median",
            Self::Min => "min",
            Self::Mode => "mode",
            Self::Stddev => "stddev",
            Self::Sum => "sum",
            Self::Variance => "variance",
        }
    }

    /// Resolve an aggregation by its wire name.
    pub fn parse(name: &str) -> Result<Self, Error> {
        match name {
            "avg" => Ok(Self::Avg),
            "count" => Ok(Self::Count),
            "count-distinct" => Ok(Self::CountDistinct),
            "distinct" => Ok(Self::Distinct),
            "max" => Ok(Self::Max),
            "median" => Ok(Self::Median),
            "min" => Ok(Self::Min),
            "mode" => Ok(Self::Mode),
            "stddev" => Ok(Self::Stddev),
            "sum" => Ok(Self::Sum),
            "variance" => Ok(Self::Variance),
            other => Err(Error::invalid_pattern(format!(
                "unknown aggregation name '{other}'"
            ))),
        }
    }
}

/// Compute one aggregation over a group of bindings.
///
/// Multiplicities replicate samples: a record with count `n` contributes `n`
/// observations of its bound value.
pub(crate) fn compute(
    kind: AggregateKind,
    var: &str,
    group: &Bindings,
    hasher: &HasherHandle,
) -> Result<Value, Error> {
    match kind {
        AggregateKind::Count => {
            let total: u64 = group
                .reduce(0u64, |acc, record, count| {
                    if record.contains_key(var) { acc + count } else { acc }
                });
            Ok(Value::Uint(total))
        }
        AggregateKind::CountDistinct => Ok(Value::Uint(distinct(var, group, hasher)?.len() as u64)),
        AggregateKind::Distinct => Ok(Value::List(
            distinct(var, group, hasher)?.into_values().collect(),
        )),
        AggregateKind::Sum => Ok(number(samples(var, group).iter().sum())),
        AggregateKind::Avg => {
            let xs = samples(var, group);
            if xs.is_empty() {
                return Ok(Value::Null);
            }
            #[expect(clippy::cast_precision_loss)]
            Ok(number(xs.iter().sum::<f64>() / xs.len() as f64))
        }
        AggregateKind::Min => Ok(samples(var, group)
            .into_iter()
            .min_by(f64::total_cmp)
            .map_or(Value::Null, number)),
        AggregateKind::Max => Ok(samples(var, group)
            .into_iter()
            .max_by(f64::total_cmp)
            .map_or(Value::Null, number)),
        AggregateKind::Median => {
            let mut xs = samples(var, group);
            if xs.is_empty() {
                return Ok(Value::Null);
            }
            xs.sort_by(f64::total_cmp);
            let mid = xs.len() / 2;
            let median = if xs.len() % 2 == 1 {
                xs[mid]
            } else {
                f64::midpoint(xs[mid - 1], xs[mid])
            };
            Ok(number(median))
        }
        AggregateKind::Mode => mode(var, group),
        AggregateKind::Variance => Ok(variance(&samples(var, group)).map_or(Value::Null, number)),
        AggregateKind::Stddev => Ok(variance(&samples(var, group))
            .map(f64::sqrt)
            .map_or(Value::Null, number)),
    }
}

// Replicated numeric observations of the variable across the group.
fn samples(var: &str, group: &Bindings) -> Vec<f64> {
    group.reduce(Vec::new(), |mut acc, record, count| {
        if let Some(x) = record.get(var).and_then(Value::as_f64) {
            for _ in 0..count {
                acc.push(x);
            }
        }
        acc
    })
}

// Distinct bound values keyed (and ordered) by canonical digest.
fn distinct(
    var: &str,
    group: &Bindings,
    hasher: &HasherHandle,
) -> Result<BTreeMap<Digest, Value>, Error> {
    let mut out = BTreeMap::new();
    for (record, _) in group.iter() {
        if let Some(value) = record.get(var) {
            out.insert(hasher.digest(value)?, value.clone());
        }
    }
    Ok(out)
}

fn mode(var: &str, group: &Bindings) -> Result<Value, Error> {
    let mut frequency: Vec<(f64, u64)> = Vec::new();
    for (record, count) in group.iter() {
        if let Some(x) = record.get(var).and_then(Value::as_f64) {
            match frequency.iter_mut().find(|(seen, _)| seen.total_cmp(&x).is_eq()) {
                Some((_, n)) => *n += count,
                None => frequency.push((x, count)),
            }
        }
    }

    // Ties resolve to the smallest value so the result is deterministic.
    frequency.sort_by(|(a, _), (b, _)| a.total_cmp(b));
    let mut best: Option<(f64, u64)> = None;
    for (x, n) in frequency {
        if best.is_none_or(|(_, m)| n > m) {
            best = Some((x, n));
        }
    }
    Ok(best.map_or(Value::Null, |(x, _)| number(x)))
}

fn variance(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() {
        return None;
    }
    #[expect(clippy::cast_precision_loss)]
    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    Some(xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n)
}

fn number(x: f64) -> Value {
    Float64::try_new(x).map_or(Value::Null, Value::Float)
}

///
/// TESTS
///
