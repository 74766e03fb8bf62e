//! Render a query back to DSL text.
//!
//! `parse(stringify(q)) == q` holds for pipelines of drop, sort, filter and
//! single-operator paging over unquoted identifiers; the other operators
//! render in the same surface syntax on a best-effort basis.

use crate::ast::{
    Action, Combine, GroupAggregation, PageOp, Query, RelationalOperator, SortDirection,
    Transformation, WindowAggregation,
};

/// Render a query as a `$`-separated chunk sequence.
pub fn stringify(query: &Query) -> String {
    let mut out = String::new();
    for transformation in &query.transformations {
        for chunk in chunks(transformation) {
            out.push('$');
            out.push_str(&chunk);
        }
    }
    match &query.action {
        Action::GetTheData => {}
        Action::Metadata => out.push_str("$metadata"),
        Action::GetSeries { key, value } => out.push_str(&format!("$series({key},{value})")),
        Action::GetRange { field } => out.push_str(&format!("$range({field})")),
    }
    out
}

fn chunks(transformation: &Transformation) -> Vec<String> {
    match transformation {
        Transformation::Empty => Vec::new(),
        Transformation::DropColumns(names) => vec![format!("drop({})", names.join(","))],
        Transformation::SortBy(fields) => {
            let fields: Vec<String> = fields
                .iter()
                .map(|(name, direction)| match direction {
                    SortDirection::Ascending => format!("{name} asc"),
                    SortDirection::Descending => format!("{name} desc"),
                })
                .collect();
            vec![format!("sort({})", fields.join(","))]
        }
        Transformation::FilterBy {
            combine,
            conditions,
        } => {
            let mut args = vec![match combine {
                Combine::And => "and".to_string(),
                Combine::Or => "or".to_string(),
            }];
            args.extend(conditions.iter().map(|c| {
                format!("{} {} {}", c.field, separator(c.op), c.value)
            }));
            vec![format!("filter({})", args.join(","))]
        }
        // Each paging operator is its own surface chunk.
        Transformation::Paging(ops) => ops
            .iter()
            .map(|op| match op {
                PageOp::Take(n) => format!("take({n})"),
                PageOp::Skip(n) => format!("skip({n})"),
            })
            .collect(),
        Transformation::GroupBy { keys, aggregations } => {
            let mut args: Vec<String> = keys.iter().map(|k| format!("by '{k}'")).collect();
            args.extend(aggregations.iter().filter_map(group_token));
            vec![format!("groupby({})", args.join(","))]
        }
        Transformation::WindowBy {
            key,
            size,
            aggregations,
        } => {
            let mut args = vec![format!("by '{key}'"), size.to_string()];
            args.extend(aggregations.iter().map(window_token));
            vec![format!("windowby({})", args.join(","))]
        }
        Transformation::ExpandBy { key, aggregations } => {
            let mut args = vec![format!("by '{key}'")];
            args.extend(aggregations.iter().map(window_token));
            vec![format!("expandby({})", args.join(","))]
        }
    }
}

fn separator(op: RelationalOperator) -> &'static str {
    match op {
        RelationalOperator::Equals => "eq",
        RelationalOperator::NotEquals => "neq",
        RelationalOperator::LessThan => "lte",
        RelationalOperator::GreaterThan => "gte",
        RelationalOperator::InRange => "in",
        RelationalOperator::Like => "like",
    }
}

fn group_token(aggregation: &GroupAggregation) -> Option<String> {
    match aggregation {
        // The parser re-adds GroupKey on its own.
        GroupAggregation::GroupKey => None,
        GroupAggregation::CountAll => Some("count-all".to_string()),
        GroupAggregation::CountDistinct(f) => Some(format!("count-distinct '{f}'")),
        GroupAggregation::ConcatValues(f) => Some(format!("concat '{f}'")),
        GroupAggregation::Sum(f) => Some(format!("sum '{f}'")),
        GroupAggregation::Mean(f) => Some(format!("mean '{f}'")),
    }
}

fn window_token(aggregation: &WindowAggregation) -> String {
    match aggregation {
        WindowAggregation::Min(f) => format!("min '{f}'"),
        WindowAggregation::Max(f) => format!("max '{f}'"),
        WindowAggregation::Sum(f) => format!("sum '{f}'"),
        WindowAggregation::Mean(f) => format!("mean '{f}'"),
        WindowAggregation::FirstKey => "first-key".to_string(),
        WindowAggregation::LastKey => "last-key".to_string(),
        WindowAggregation::MiddleKey => "middle-key".to_string(),
    }
}

// ============ Sanity Tests ============
// The round-trip property lives in tests/property.rs.

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;

    #[test]
    fn stringify_then_parse_round_trips() {
        let query = parse("$drop(a,b)$sort(x asc,y desc)$filter(or,x gte 3)$take(5)").unwrap();
        assert_eq!(parse(&stringify(&query)).unwrap(), query);
    }

    #[test]
    fn actions_render_as_tail_chunks() {
        let query = parse("$sort(x asc)$range('x')").unwrap();
        assert_eq!(stringify(&query), "$sort(x asc)$range(x)");
    }
}
