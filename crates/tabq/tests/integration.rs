//! Black-box integration tests for tabq.
//!
//! These exercise the full parse → evaluate → render pipeline over datasets
//! materialized from textual records, plus the SQL dispatch path through a
//! fake client.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

use tabq::{
    DataSet, EvalOptions, InferredType, Metadata, QueryEngine, Request, Row, SqlClient, SqlError,
    SqlRow, TabqError, from_records, run,
};

fn people() -> DataSet {
    from_records(
        &["name", "age", "city"],
        &[
            vec!["sandra", "19", "London"],
            vec!["andy", "17", "Leeds"],
            vec!["bob", "30", "London"],
        ],
    )
    .unwrap()
}

fn sales() -> DataSet {
    from_records(
        &["city", "amt"],
        &[vec!["A", "1"], vec!["A", "2"], vec!["B", "3"]],
    )
    .unwrap()
}

fn ticks() -> DataSet {
    from_records(
        &["d", "v"],
        &[vec!["1", "10"], vec!["2", "20"], vec!["3", "40"]],
    )
    .unwrap()
}

// ============ Sort and paging ============

#[test]
fn sort_then_take() {
    let dataset = from_records(
        &["n", "a"],
        &[vec!["b", "1"], vec!["a", "2"], vec!["a", "1"]],
    )
    .unwrap();
    let out = run("$sort(n asc,a desc)$take(2)", &dataset).unwrap();
    assert_eq!(
        out,
        json!([{"n": "a", "a": 2.0}, {"n": "a", "a": 1.0}])
    );
}

#[test]
fn sort_is_stable() {
    let dataset = from_records(
        &["name", "grade"],
        &[vec!["x", "7"], vec!["y", "7"], vec!["z", "7"]],
    )
    .unwrap();
    let out = run("$sort(grade asc)", &dataset).unwrap();
    let names: Vec<&str> = out
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["x", "y", "z"]);
}

#[test]
fn paging_chunks_compose_in_order() {
    let records: Vec<Vec<String>> = (0..20).map(|i| vec![i.to_string()]).collect();
    let header = ["i".to_string()];
    let dataset = from_records(&header, &records).unwrap();

    let out = run("$take(10)$skip(2)", &dataset).unwrap();
    assert_eq!(out.as_array().unwrap().len(), 8);

    let out = run("$skip(2)$take(10)", &dataset).unwrap();
    let array = out.as_array().unwrap();
    assert_eq!(array.len(), 10);
    assert_eq!(array[0]["i"], json!(2.0));
}

#[test]
fn skipping_past_the_end_fails() {
    let out = run("$skip(9)", &people());
    assert!(matches!(out, Err(TabqError::Eval(_))));
}

#[test]
fn drop_removes_columns() {
    let out = run("$drop('age')", &people()).unwrap();
    assert_eq!(
        out.as_array().unwrap()[0],
        json!({"name": "sandra", "city": "London"})
    );
}

// ============ Filter ============

#[test]
fn filter_defaults_to_intersection() {
    let out = run("$filter(age gte 18,name like 'an')", &people()).unwrap();
    assert_eq!(out, json!([{"name": "sandra", "age": 19.0, "city": "London"}]));
}

#[test]
fn filter_or_takes_the_union() {
    let out = run("$filter(or,age gte 18,name like 'an')", &people()).unwrap();
    let names: Vec<&str> = out
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["sandra", "andy", "bob"]);
}

#[test]
fn like_is_case_insensitive_containment() {
    let out = run("$filter(city like 'LON')", &people()).unwrap();
    assert_eq!(out.as_array().unwrap().len(), 2);
}

#[test]
fn dates_filter_by_instant_range() {
    let dataset = from_records(
        &["when", "v"],
        &[
            vec!["2020-01-05", "1"],
            vec!["2020-01-15", "2"],
            vec!["2020-02-01", "3"],
        ],
    )
    .unwrap();
    let out = run("$filter(when in '2020-01-10,2020-01-20')", &dataset).unwrap();
    assert_eq!(out.as_array().unwrap().len(), 1);
    assert_eq!(out[0]["when"], json!("2020-01-15T00:00:00Z"));
}

#[test]
fn bools_compare_against_true_false_literals() {
    let dataset = from_records(
        &["name", "active"],
        &[vec!["a", "true"], vec!["b", "false"], vec!["c", "TRUE"]],
    )
    .unwrap();
    let out = run("$filter(active eq 'true')", &dataset).unwrap();
    assert_eq!(out.as_array().unwrap().len(), 2);
}

#[test]
fn ordering_a_string_column_is_rejected() {
    let out = run("$filter(name gte 'k')", &people());
    assert!(matches!(out, Err(TabqError::Eval(_))));
}

#[test]
fn equality_on_numbers_is_rejected() {
    let out = run("$filter(age eq 19)", &people());
    assert!(matches!(out, Err(TabqError::Eval(_))));
}

// ============ Grouping ============

#[test]
fn groupby_counts_and_sums() {
    let out = run("$groupby(by 'city',count-all,sum 'amt')", &sales()).unwrap();
    assert_eq!(
        out,
        json!([
            {"city": "A", "count": 2.0, "amt": 3.0},
            {"city": "B", "count": 1.0, "amt": 3.0},
        ])
    );
}

#[test]
fn groupby_distinct_and_concat() {
    let dataset = from_records(
        &["team", "member"],
        &[
            vec!["red", "ann"],
            vec!["red", "ann"],
            vec!["red", "ben"],
            vec!["blue", "cid"],
        ],
    )
    .unwrap();
    let out = run(
        "$groupby(by 'team',count-distinct 'member',concat 'member')",
        &dataset,
    )
    .unwrap();
    // One aggregation output per token, concatenated left to right; the
    // later concat wins the "member" key in the JSON object.
    assert_eq!(out[0]["team"], json!("red"));
    assert_eq!(out[0]["member"], json!("ann, ben"));
    assert_eq!(out[1]["member"], json!("cid"));
}

#[test]
fn groups_emit_in_first_occurrence_order() {
    let dataset = from_records(
        &["k"],
        &[vec!["z"], vec!["a"], vec!["z"], vec!["m"], vec!["a"]],
    )
    .unwrap();
    let out = run("$groupby(by 'k',count-all)", &dataset).unwrap();
    let keys: Vec<&str> = out
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["k"].as_str().unwrap())
        .collect();
    assert_eq!(keys, ["z", "a", "m"]);
}

// ============ Windows ============

#[test]
fn sliding_windows_emit_one_row_per_shift() {
    let out = run("$windowby(by 'd',2,first-key,last-key,mean 'v')", &ticks()).unwrap();
    assert_eq!(
        out,
        json!([
            {"first d": 1.0, "last d": 2.0, "v": 15.0},
            {"first d": 2.0, "last d": 3.0, "v": 30.0},
        ])
    );
}

#[test]
fn window_min_and_middle_key() {
    let dataset = from_records(
        &["d", "v"],
        &[
            vec!["1", "5"],
            vec!["2", "3"],
            vec!["3", "4"],
            vec!["4", "1"],
        ],
    )
    .unwrap();
    let out = run("$windowby(by 'd',3,middle-key,min 'v')", &dataset).unwrap();
    assert_eq!(
        out,
        json!([
            {"middle d": 2.0, "v": 3.0},
            {"middle d": 3.0, "v": 1.0},
        ])
    );
}

#[test]
fn expanding_aggregations_run_per_row() {
    let out = run("$expandby(by 'd',first-key,last-key,sum 'v')", &ticks()).unwrap();
    assert_eq!(
        out,
        json!([
            {"first d": 1.0, "last d": 1.0, "v": 10.0},
            {"first d": 1.0, "last d": 2.0, "v": 30.0},
            {"first d": 1.0, "last d": 3.0, "v": 70.0},
        ])
    );
}

#[test]
fn running_mean_matches_historical_accumulator() {
    // sum and count both grow by the value, so a constant series reads 1.
    let dataset = from_records(
        &["d", "v"],
        &[vec!["1", "5"], vec!["2", "5"], vec!["3", "5"]],
    )
    .unwrap();
    let out = run("$expandby(by 'd',mean 'v')", &dataset).unwrap();
    assert_eq!(out[2]["v"], json!(1.0));

    let mut engine = QueryEngine::with_options(EvalOptions {
        corrected_running_mean: true,
    });
    engine.add_dataset("t", dataset);
    let out = engine
        .execute("t", &Request::query("$expandby(by 'd',mean 'v')"))
        .unwrap();
    assert_eq!(out[2]["v"], json!(5.0));
}

// ============ Actions ============

#[test]
fn metadata_reports_external_type_names() {
    let dataset = from_records(
        &["s", "n", "x", "flag", "bit", "when"],
        &[
            vec!["hi", "4", "1.5", "true", "1", "13/01/2020"],
            vec!["yo", "7", "2.0", "false", "0", "01/01/2020"],
        ],
    )
    .unwrap();
    let out = run("$metadata", &dataset).unwrap();
    assert_eq!(
        out,
        json!({
            "s": "string",
            "n": "number",
            "x": "number",
            "flag": "bool",
            "bit": "bool",
            "when": "date",
        })
    );
}

#[test]
fn series_projects_key_value_tuples() {
    let out = run("$series('d','v')", &ticks()).unwrap();
    assert_eq!(out, json!([[1.0, 10.0], [2.0, 20.0], [3.0, 40.0]]));
}

#[test]
fn range_lists_distinct_values_in_first_occurrence_order() {
    let dataset = from_records(
        &["country"],
        &[
            vec!["no"],
            vec!["uk"],
            vec!["no"],
            vec!["fr"],
            vec!["uk"],
        ],
    )
    .unwrap();
    let out = run("$range('country')", &dataset).unwrap();
    assert_eq!(out, json!(["no", "uk", "fr"]));
}

#[test]
fn preview_truncates_to_ten_rows() {
    let records: Vec<Vec<String>> = (0..25).map(|i| vec![i.to_string()]).collect();
    let header = ["i".to_string()];
    let mut engine = QueryEngine::new();
    engine.add_dataset("wide", from_records(&header, &records).unwrap());

    let out = engine
        .execute(
            "wide",
            &Request::new(vec!["preview".to_string(), String::new()]),
        )
        .unwrap();
    assert_eq!(out.as_array().unwrap().len(), 10);

    let out = engine.execute("wide", &Request::new(vec![String::new()])).unwrap();
    assert_eq!(out.as_array().unwrap().len(), 25);
}

#[test]
fn unknown_table_is_an_error() {
    let engine = QueryEngine::new();
    assert!(matches!(
        engine.execute("ghost", &Request::default()),
        Err(TabqError::UnknownTable(_))
    ));
}

// ============ SQL dispatch ============

enum Cell {
    Null,
    Text(&'static str),
    Int(i32),
}

struct FakeRow(Vec<Cell>);

impl SqlRow for FakeRow {
    fn is_null(&self, index: usize) -> bool {
        matches!(self.0[index], Cell::Null)
    }
    fn get_string(&self, index: usize) -> String {
        match &self.0[index] {
            Cell::Text(s) => s.to_string(),
            _ => String::new(),
        }
    }
    fn get_bool(&self, _index: usize) -> bool {
        false
    }
    fn get_date(&self, _index: usize) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap()
    }
    fn get_int32(&self, index: usize) -> i32 {
        match self.0[index] {
            Cell::Int(n) => n,
            _ => 0,
        }
    }
    fn get_float(&self, _index: usize) -> f64 {
        0.0
    }
}

struct FakeClient {
    rows: Vec<FakeRow>,
    statements: Mutex<Vec<String>>,
}

impl SqlClient for FakeClient {
    fn execute_reader(
        &self,
        _connection_string: &str,
        sql: &str,
        mapper: &mut dyn FnMut(&dyn SqlRow) -> Result<Row, SqlError>,
    ) -> Result<Vec<Row>, SqlError> {
        self.statements.lock().unwrap().push(sql.to_string());
        self.rows.iter().map(|row| mapper(row)).collect()
    }
}

fn employee_metadata() -> Metadata {
    vec![
        ("name".to_string(), InferredType::String),
        ("age".to_string(), InferredType::Int),
    ]
}

fn sql_engine(rows: Vec<FakeRow>) -> (QueryEngine, Arc<FakeClient>) {
    let client = Arc::new(FakeClient {
        rows,
        statements: Mutex::new(Vec::new()),
    });
    let mut engine = QueryEngine::new();
    engine.add_sql_table("emp", "T", employee_metadata());
    engine.set_sql_client("Server=test", client.clone());
    (engine, client)
}

#[test]
fn sql_path_translates_sort_and_paging() {
    let (engine, client) = sql_engine(vec![
        FakeRow(vec![Cell::Text("ann"), Cell::Int(41)]),
        FakeRow(vec![Cell::Text("bo"), Cell::Int(39)]),
    ]);

    let out = engine
        .execute("emp", &Request::query("$sort('age' desc)$skip(10)$take(5)"))
        .unwrap();

    assert_eq!(
        client.statements.lock().unwrap()[0],
        "SELECT [name], [age] FROM [T] ORDER BY [age] DESC \
         OFFSET 10 ROWS FETCH NEXT 5 ROWS ONLY"
    );
    assert_eq!(
        out,
        json!([{"name": "ann", "age": 41.0}, {"name": "bo", "age": 39.0}])
    );
}

#[test]
fn sql_preview_appends_a_take() {
    let (engine, client) = sql_engine(Vec::new());
    engine
        .execute(
            "emp",
            &Request::new(vec!["preview".to_string(), "$sort(age asc)".to_string()]),
        )
        .unwrap();
    assert_eq!(
        client.statements.lock().unwrap()[0],
        "SELECT [name], [age] FROM [T] ORDER BY [age] ASC \
         OFFSET 0 ROWS FETCH NEXT 10 ROWS ONLY"
    );
}

#[test]
fn sql_metadata_skips_the_round_trip() {
    let (engine, client) = sql_engine(Vec::new());
    let out = engine.execute("emp", &Request::query("$metadata")).unwrap();
    assert_eq!(out, json!({"name": "string", "age": "number"}));
    assert!(client.statements.lock().unwrap().is_empty());
}

#[test]
fn sql_series_and_range_are_not_supported() {
    let (engine, client) = sql_engine(Vec::new());
    let out = engine
        .execute("emp", &Request::query("$series('name','age')"))
        .unwrap();
    assert_eq!(out, json!([]));
    let out = engine.execute("emp", &Request::query("$range('age')")).unwrap();
    assert_eq!(out, json!([]));
    assert!(client.statements.lock().unwrap().is_empty());
}

#[test]
fn sql_null_text_reads_as_empty_string() {
    let (engine, _client) = sql_engine(vec![FakeRow(vec![Cell::Null, Cell::Int(7)])]);
    let out = engine.execute("emp", &Request::query("")).unwrap();
    assert_eq!(out, json!([{"name": "", "age": 7.0}]));
}

#[test]
fn sql_null_number_is_an_error() {
    let (engine, _client) = sql_engine(vec![FakeRow(vec![Cell::Text("ann"), Cell::Null])]);
    let out = engine.execute("emp", &Request::query(""));
    assert!(matches!(out, Err(TabqError::Sql(SqlError::UnexpectedNull(_)))));
}
