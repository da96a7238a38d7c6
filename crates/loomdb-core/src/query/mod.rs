mod aggregate;
mod engine;
mod input;

use crate::{
    error::Error,
    pattern::{Pattern, optimize, parse_pattern, pattern_to_value, variable},
    value::{HasherHandle, Value},
};
use serde::{Deserialize, Serialize};

// re-exports
pub use aggregate::AggregateKind;
pub use engine::run_query;
pub use input::{InClause, parse_inputs};

/// Wire tag opening an aggregate return term.
pub const AGGREGATE_TAG: &str = "::aggregate";

///
/// ReturnTerm
///
/// One element of a query's return clause: a free variable or an
/// aggregation over one.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ReturnTerm {
    Var(String),
    Aggregate(AggregateKind, String),
}

impl ReturnTerm {
    #[must_use]
    pub const fn is_aggregate(&self) -> bool {
        matches!(self, Self::Aggregate(..))
    }

    #[must_use]
    pub fn to_wire(&self) -> Value {
        match self {
            Self::Var(name) => Value::Text(name.clone()),
            Self::Aggregate(kind, var) => Value::List(vec![
                Value::Text(AGGREGATE_TAG.to_string()),
                Value::Text(kind.name().to_string()),
                Value::Text(var.clone()),
            ]),
        }
    }

    pub fn parse(value: &Value) -> Result<Self, Error> {
        match value {
            Value::Text(name) => Ok(Self::Var(name.clone())),
            Value::List(items) => {
                let [Value::Text(tag), Value::Text(name), Value::Text(var)] = items.as_slice()
                else {
                    return Err(Error::invalid_pattern("malformed aggregate return term"));
                };
                if tag != AGGREGATE_TAG {
                    return Err(Error::invalid_pattern(format!(
                        "unknown return term tag '{tag}'"
                    )));
                }
                Ok(Self::Aggregate(AggregateKind::parse(name)?, var.clone()))
            }
            other => Err(Error::invalid_pattern(format!(
                "return term must be a variable or an aggregate, got {}",
                other.canonical_tag().label()
            ))),
        }
    }
}

///
/// RETURN-TERM BUILDERS
///

/// Free-variable return term; the `?` sigil is added when absent.
#[must_use]
pub fn ret(name: &str) -> ReturnTerm {
    ReturnTerm::Var(variable(name))
}

macro_rules! aggregate_builders {
    ( $( $(#[$doc:meta])* $fn_name:ident => $kind:ident ),* $(,)? ) => {
        $(
            $(#[$doc])*
            #[must_use]
            pub fn $fn_name(var: &str) -> ReturnTerm {
                ReturnTerm::Aggregate(AggregateKind::$kind, variable(var))
            }
        )*
    };
}

aggregate_builders! {
    /// Multiplicity-weighted count of bound values.
    count => Count,
    /// Count of distinct bound values.
    count_distinct => CountDistinct,
    /// List of distinct bound values.
    distinct => Distinct,
    /// Numeric sum.
    sum => Sum,
    /// Numeric mean.
    avg => Avg,
    /// Numeric minimum.
    min => Min,
    /// Numeric maximum.
    max => Max,
    /// Numeric median.
    median => Median,
    /// Most frequent numeric value.
    mode => Mode,
    /// Population standard deviation.
    stddev => Stddev,
    /// Population variance.
    variance => Variance,
}

///
/// Find
///
/// The shape of a query's return clause. A single term produces scalar
/// rows; a term list produces tuple rows.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Find {
    Single(ReturnTerm),
    Terms(Vec<ReturnTerm>),
}

impl Find {
    #[must_use]
    pub fn terms(&self) -> Vec<ReturnTerm> {
        match self {
            Self::Single(term) => vec![term.clone()],
            Self::Terms(terms) => terms.clone(),
        }
    }

    #[must_use]
    pub const fn is_single(&self) -> bool {
        matches!(self, Self::Single(_))
    }

    // Variables must precede aggregates in a return list.
    fn validate(&self) -> Result<(), Error> {
        let terms = match self {
            Self::Single(_) => return Ok(()),
            Self::Terms(terms) => terms,
        };
        if terms.is_empty() {
            return Err(Error::invalid_pattern("return clause is empty"));
        }

        let mut seen_aggregate = false;
        for term in terms {
            match term {
                ReturnTerm::Aggregate(..) => seen_aggregate = true,
                ReturnTerm::Var(name) => {
                    if seen_aggregate {
                        return Err(Error::invalid_pattern(format!(
                            "return variable '{name}' follows an aggregate; variables must come first"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    #[must_use]
    fn to_wire(&self) -> Value {
        match self {
            Self::Single(term) => term.to_wire(),
            Self::Terms(terms) => Value::List(terms.iter().map(ReturnTerm::to_wire).collect()),
        }
    }

    fn parse(value: &Value) -> Result<Self, Error> {
        match value {
            Value::List(items)
                if !matches!(items.first(), Some(Value::Text(tag)) if tag == AGGREGATE_TAG) =>
            {
                Ok(Self::Terms(
                    items
                        .iter()
                        .map(ReturnTerm::parse)
                        .collect::<Result<_, _>>()?,
                ))
            }
            single => Ok(Self::Single(ReturnTerm::parse(single)?)),
        }
    }
}

///
/// Query
///
/// A declarative query: return clause, where pattern, optional input
/// clauses, and result shaping.
///

#[derive(Clone, Debug)]
pub struct Query {
    pub find: Find,
    pub clause: Pattern,
    pub inputs: Vec<InClause>,
    pub limit: Option<u64>,
    pub offset: u64,
}

impl Query {
    /// Query returning a single term.
    #[must_use]
    pub fn find_one(term: ReturnTerm, clause: Pattern) -> Self {
        Self {
            find: Find::Single(term),
            clause,
            inputs: Vec::new(),
            limit: None,
            offset: 0,
        }
    }

    /// Query returning a tuple of terms.
    #[must_use]
    pub fn find<I: IntoIterator<Item = ReturnTerm>>(terms: I, clause: Pattern) -> Self {
        Self {
            find: Find::Terms(terms.into_iter().collect()),
            clause,
            inputs: Vec::new(),
            limit: None,
            offset: 0,
        }
    }

    /// Append an input clause.
    #[must_use]
    pub fn input(mut self, clause: InClause) -> Self {
        self.inputs.push(clause);
        self
    }

    /// Cap the result row count. Negative limits are invalid.
    pub fn limit(mut self, limit: i64) -> Result<Self, Error> {
        if limit < 0 {
            return Err(Error::invalid_argument("limit must be non-negative"));
        }
        self.limit = Some(limit.unsigned_abs());
        Ok(self)
    }

    /// Skip leading result rows. Negative offsets are invalid.
    pub fn offset(mut self, offset: i64) -> Result<Self, Error> {
        if offset < 0 {
            return Err(Error::invalid_argument("offset must be non-negative"));
        }
        self.offset = offset.unsigned_abs();
        Ok(self)
    }
}

///
/// CompiledQuery
///
/// A validated query with its pattern optimized for matching. The wire form
/// round-trips: compile → serialize → parse → run yields identical results.
///

#[derive(Clone, Debug)]
pub struct CompiledQuery {
    pub(crate) find: Find,
    pub(crate) clause: Pattern,
    pub(crate) inputs: Vec<InClause>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: u64,
}

impl CompiledQuery {
    #[must_use]
    pub const fn find(&self) -> &Find {
        &self.find
    }

    #[must_use]
    pub const fn clause(&self) -> &Pattern {
        &self.clause
    }

    /// Serialize into the wire structure. Fails for test predicates.
    pub fn to_wire(&self) -> Result<QueryWire, Error> {
        Ok(QueryWire {
            find: self.find.to_wire(),
            clause: pattern_to_value(&self.clause)?,
            inputs: Value::List(self.inputs.iter().map(InClause::to_wire).collect()),
            limit: self.limit,
            offset: self.offset,
        })
    }

    /// Rebuild a compiled query from its wire structure.
    pub fn from_wire(wire: &QueryWire) -> Result<Self, Error> {
        let find = Find::parse(&wire.find)?;
        find.validate()?;

        let inputs = wire
            .inputs
            .as_list()
            .ok_or_else(|| Error::invalid_pattern("input clause list must be an array"))?
            .iter()
            .map(InClause::parse)
            .collect::<Result<_, _>>()?;

        Ok(Self {
            find,
            clause: optimize(parse_pattern(&wire.clause)?),
            inputs,
            limit: wire.limit,
            offset: wire.offset,
        })
    }
}

///
/// QueryWire
///
/// Serialized query layout. The pattern is carried in its value wire form.
///

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct QueryWire {
    pub find: Value,
    #[serde(rename = "where")]
    pub clause: Value,
    #[serde(rename = "in")]
    pub inputs: Value,
    pub limit: Option<u64>,
    pub offset: u64,
}

/// Validate and optimize a query for execution.
pub fn create_query(query: Query) -> Result<CompiledQuery, Error> {
    query.find.validate()?;

    Ok(CompiledQuery {
        find: query.find,
        clause: optimize(query.clause),
        inputs: query.inputs,
        limit: query.limit,
        offset: query.offset,
    })
}

///
/// QueryOptions
///
/// Per-run overrides: result shaping and hasher injection.
///

#[derive(Clone, Default)]
pub struct QueryOptions {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub hasher: Option<HasherHandle>,
}

impl std::fmt::Debug for QueryOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryOptions")
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .field("hasher", &self.hasher.is_some())
            .finish()
    }
}

///
/// ResultSet
///
/// `result` holds the shaped rows; `size` counts every matched row before
/// shaping, `count` the rows that survived offset/limit.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResultSet {
    pub result: Value,
    pub size: usize,
    pub count: usize,
    pub offset: usize,
}

///
/// TESTS
///
