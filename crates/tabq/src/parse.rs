//! Parser for the URL-encoded transformation DSL.
//!
//! A query string is a sequence of `$`-separated chunks shaped
//! `name(arg1,arg2,…)`. Single-quoted argument segments keep commas (and
//! closing parens) literal; quotes are retained by the splitter and only
//! stripped by `trim_ident` once a token's role is known.

use thiserror::Error;
use winnow::combinator::{alt, delimited, opt, repeat};
use winnow::prelude::*;
use winnow::token::{none_of, take_while};

use crate::ast::{
    Action, Combine, Condition, GroupAggregation, PageOp, Query, RelationalOperator,
    SortDirection, Transformation, WindowAggregation,
};

type PResult<T> = winnow::ModalResult<T>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("unknown operation: {0:?}")]
    UnknownOperation(String),
    #[error("malformed chunk: {0:?}")]
    MalformedChunk(String),
    #[error("unknown aggregation: {0:?}")]
    UnknownAggregation(String),
    #[error("{op} expects {expected}")]
    BadArguments { op: &'static str, expected: &'static str },
    #[error("cannot read {0:?} as a count")]
    BadCount(String),
    #[error("no relational operator in condition {0:?}")]
    BadCondition(String),
}

/// Parse a URL-decoded query string into a [`Query`].
pub fn parse(input: &str) -> Result<Query, ParseError> {
    let mut chunks = input
        .split('$')
        .filter(|chunk| !chunk.is_empty())
        .map(parse_chunk)
        .collect::<Result<Vec<_>, _>>()?;

    // The last chunk may name the action; everything else transforms rows.
    let action = match chunks.last().and_then(action_of) {
        Some(action) => {
            chunks.pop();
            action
        }
        None => Action::GetTheData,
    };

    let transformations = chunks
        .iter()
        .map(transformation_of)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Query {
        transformations,
        action,
    })
}

// ============ Chunk structure ============

#[derive(Debug, Clone, PartialEq)]
struct Chunk {
    op: String,
    args: Vec<String>,
}

fn parse_chunk(raw: &str) -> Result<Chunk, ParseError> {
    chunk
        .parse(raw)
        .map_err(|_| ParseError::MalformedChunk(raw.to_string()))
}

fn chunk(input: &mut &str) -> PResult<Chunk> {
    let op = take_while(1.., |c: char| c != '(').parse_next(input)?;
    let body: Option<&str> = opt(delimited('(', arg_body, ')')).parse_next(input)?;
    Ok(Chunk {
        op: op.to_string(),
        args: body.map(split_args).unwrap_or_default(),
    })
}

/// Everything up to the chunk's closing paren; a quoted segment may hide a
/// `)` so it is consumed as a unit.
fn arg_body<'a>(input: &mut &'a str) -> PResult<&'a str> {
    repeat::<_, _, (), _, _>(0.., alt((quoted.void(), none_of(')').void())))
        .take()
        .parse_next(input)
}

fn quoted<'a>(input: &mut &'a str) -> PResult<&'a str> {
    ('\'', take_while(0.., |c: char| c != '\''), '\'')
        .take()
        .parse_next(input)
}

/// Quote-aware comma split. The quoted flag toggles on every `'`; commas
/// split only outside quotes, and quote characters stay in the token.
fn split_args(raw: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in raw.chars() {
        match c {
            '\'' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ',' if !in_quotes => args.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    if !current.is_empty() || !args.is_empty() {
        args.push(current);
    }
    args
}

/// Strip one outer pair of single quotes, if present.
pub(crate) fn trim_ident(token: &str) -> String {
    if token.len() >= 2 && token.starts_with('\'') && token.ends_with('\'') {
        token[1..token.len() - 1].to_string()
    } else {
        token.to_string()
    }
}

// ============ Chunk → transformation ============

fn transformation_of(chunk: &Chunk) -> Result<Transformation, ParseError> {
    match chunk.op.as_str() {
        "drop" => Ok(Transformation::DropColumns(
            chunk.args.iter().map(|a| trim_ident(a)).collect(),
        )),
        "sort" => Ok(Transformation::SortBy(
            chunk.args.iter().map(|a| sort_field(a)).collect(),
        )),
        "filter" => filter_of(&chunk.args),
        "groupby" => group_by_of(&chunk.args),
        "windowby" => window_by_of(&chunk.args),
        "expandby" => expand_by_of(&chunk.args),
        "take" => Ok(Transformation::Paging(vec![PageOp::Take(count_of(
            "take",
            &chunk.args,
        )?)])),
        "skip" => Ok(Transformation::Paging(vec![PageOp::Skip(count_of(
            "skip",
            &chunk.args,
        )?)])),
        op => Err(ParseError::UnknownOperation(op.to_string())),
    }
}

/// `col`, `col asc` or `col desc`; the space before the suffix is part of
/// the grammar, so a column literally named "desc" stays a column.
fn sort_field(token: &str) -> (String, SortDirection) {
    if let Some(rest) = token.strip_suffix(" desc") {
        (trim_ident(rest), SortDirection::Descending)
    } else if let Some(rest) = token.strip_suffix(" asc") {
        (trim_ident(rest), SortDirection::Ascending)
    } else {
        (trim_ident(token), SortDirection::Ascending)
    }
}

fn count_of(op: &'static str, args: &[String]) -> Result<usize, ParseError> {
    let [arg] = args else {
        return Err(ParseError::BadArguments {
            op,
            expected: "a single count",
        });
    };
    trim_ident(arg)
        .parse::<usize>()
        .map_err(|_| ParseError::BadCount(arg.clone()))
}

// ============ Filter conditions ============

const OPERATORS: &[(&str, RelationalOperator)] = &[
    (" eq ", RelationalOperator::Equals),
    (" neq ", RelationalOperator::NotEquals),
    (" lte ", RelationalOperator::LessThan),
    (" gte ", RelationalOperator::GreaterThan),
    (" in ", RelationalOperator::InRange),
    (" like ", RelationalOperator::Like),
];

fn filter_of(args: &[String]) -> Result<Transformation, ParseError> {
    let (combine, rest) = match args.first().map(String::as_str) {
        Some("and") => (Combine::And, &args[1..]),
        Some("or") => (Combine::Or, &args[1..]),
        _ => (Combine::And, args),
    };
    let conditions = rest
        .iter()
        .map(|c| condition_of(c))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Transformation::FilterBy {
        combine,
        conditions,
    })
}

/// Split a condition at the first operator separator, skipping over an
/// initial quoted field name.
fn condition_of(raw: &str) -> Result<Condition, ParseError> {
    let start = if raw.starts_with('\'') {
        raw[1..].find('\'').map(|i| i + 2).unwrap_or(0)
    } else {
        0
    };

    let mut found: Option<(usize, &str, RelationalOperator)> = None;
    for (separator, op) in OPERATORS {
        if let Some(at) = raw[start..].find(separator) {
            let at = at + start;
            if found.is_none_or(|(best, _, _)| at < best) {
                found = Some((at, separator, *op));
            }
        }
    }

    let (at, separator, op) =
        found.ok_or_else(|| ParseError::BadCondition(raw.to_string()))?;
    Ok(Condition {
        op,
        field: trim_ident(&raw[..at]),
        value: trim_ident(&raw[at + separator.len()..]),
    })
}

// ============ Aggregation tokens ============

const GROUP_NULLARY: &[(&str, GroupAggregation)] = &[("count-all", GroupAggregation::CountAll)];

const GROUP_UNARY: &[(&str, fn(String) -> GroupAggregation)] = &[
    ("count-distinct", GroupAggregation::CountDistinct),
    ("concat", GroupAggregation::ConcatValues),
    ("sum", GroupAggregation::Sum),
    ("mean", GroupAggregation::Mean),
];

const WINDOW_NULLARY: &[(&str, WindowAggregation)] = &[
    ("first-key", WindowAggregation::FirstKey),
    ("last-key", WindowAggregation::LastKey),
    ("middle-key", WindowAggregation::MiddleKey),
];

const WINDOW_UNARY: &[(&str, fn(String) -> WindowAggregation)] = &[
    ("min", WindowAggregation::Min),
    ("max", WindowAggregation::Max),
    ("sum", WindowAggregation::Sum),
    ("mean", WindowAggregation::Mean),
];

/// Nullary tokens match exactly; unary tokens are a known prefix, one
/// separator character, and a field identifier.
fn aggregation_of<T: Clone>(
    token: &str,
    nullary: &[(&str, T)],
    unary: &[(&str, fn(String) -> T)],
) -> Result<T, ParseError> {
    if let Some((_, agg)) = nullary.iter().find(|(name, _)| *name == token) {
        return Ok(agg.clone());
    }
    for (name, build) in unary {
        if let Some(rest) = token.strip_prefix(name)
            && !rest.is_empty()
        {
            return Ok(build(trim_ident(&rest[1..])));
        }
    }
    Err(ParseError::UnknownAggregation(token.to_string()))
}

/// `by <key>` prefix used by the grouping operators.
fn key_of(token: &str) -> Option<String> {
    token.strip_prefix("by ").map(trim_ident)
}

fn group_by_of(args: &[String]) -> Result<Transformation, ParseError> {
    let keys: Vec<String> = args.iter().map_while(|a| key_of(a)).collect();
    // Grouping keys are always emitted, so GroupKey leads the list.
    let mut aggregations = vec![GroupAggregation::GroupKey];
    for token in &args[keys.len()..] {
        aggregations.push(aggregation_of(token, GROUP_NULLARY, GROUP_UNARY)?);
    }
    Ok(Transformation::GroupBy { keys, aggregations })
}

fn window_by_of(args: &[String]) -> Result<Transformation, ParseError> {
    let (Some(first), Some(second)) = (args.first(), args.get(1)) else {
        return Err(ParseError::BadArguments {
            op: "windowby",
            expected: "a key, a window size and aggregations",
        });
    };
    let key = key_of(first).ok_or(ParseError::BadArguments {
        op: "windowby",
        expected: "a leading 'by <key>' argument",
    })?;
    let size = trim_ident(second)
        .parse::<usize>()
        .map_err(|_| ParseError::BadCount(second.clone()))?;
    let aggregations = args[2..]
        .iter()
        .map(|token| aggregation_of(token, WINDOW_NULLARY, WINDOW_UNARY))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Transformation::WindowBy {
        key,
        size,
        aggregations,
    })
}

fn expand_by_of(args: &[String]) -> Result<Transformation, ParseError> {
    let Some(first) = args.first() else {
        return Err(ParseError::BadArguments {
            op: "expandby",
            expected: "a key and aggregations",
        });
    };
    let key = key_of(first).ok_or(ParseError::BadArguments {
        op: "expandby",
        expected: "a leading 'by <key>' argument",
    })?;
    let aggregations = args[1..]
        .iter()
        .map(|token| aggregation_of(token, WINDOW_NULLARY, WINDOW_UNARY))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Transformation::ExpandBy { key, aggregations })
}

// ============ Tail action ============

fn action_of(chunk: &Chunk) -> Option<Action> {
    match chunk.op.as_str() {
        "metadata" if chunk.args.is_empty() => Some(Action::Metadata),
        "series" if chunk.args.len() == 2 => Some(Action::GetSeries {
            key: trim_ident(&chunk.args[0]),
            value: trim_ident(&chunk.args[1]),
        }),
        "range" if chunk.args.len() == 1 => Some(Action::GetRange {
            field: trim_ident(&chunk.args[0]),
        }),
        _ => None,
    }
}

// ============ Sanity Tests ============
// Full pipeline coverage lives in tests/integration.rs.
