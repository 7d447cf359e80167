//! Edge case tests for pgdoc-engine
//!
//! These tests cover boundary conditions and unusual inputs.

use pgdoc_engine::{
    categorize, CollectionSchema, Direction, Document, Error, FieldPath, MangoQuery, Param,
    PrimaryKey, QuerySpec, StoredRow, WriteKind, WriteRow,
};
use serde_json::{json, Value};
use std::collections::HashMap;

fn doc(value: Value) -> Document {
    Document::new(value).unwrap()
}

fn compile(selector: Value) -> pgdoc_engine::CompiledQuery {
    QuerySpec::parse(&selector).unwrap().compile()
}

// ============================================================================
// String Edge Cases
// ============================================================================

#[test]
fn quotes_in_field_names_and_values() {
    let compiled = compile(json!({"o'brien\"": "it's"}));
    assert!(compiled.filter.sql.contains("'o''brien\"'"));
    assert_eq!(compiled.params(), &[Param::Text("it's".into())]);
    assert!(compiled.matches(&json!({"o'brien\"": "it's"})));
}

#[test]
fn injection_attempts_stay_parameters() {
    let payload = "x'); DROP TABLE users; --";
    let compiled = compile(json!({"name": payload}));
    assert!(!compiled.filter.sql.contains("DROP"));
    assert_eq!(compiled.params(), &[Param::Text(payload.into())]);
}

#[test]
fn unicode_values() {
    for name in ["日本語テスト", "Привет мир", "🎉🚀💯", "Hello\nWorld\tTab"] {
        let compiled = compile(json!({"name": name}));
        assert!(compiled.matches(&json!({"name": name})));
        assert!(!compiled.matches(&json!({"name": format!("{name}!")})));
    }
}

#[test]
fn empty_string_equality() {
    let compiled = compile(json!({"name": ""}));
    assert!(compiled.matches(&json!({"name": ""})));
    assert!(!compiled.matches(&json!({})));
    assert!(!compiled.matches(&json!({"name": null})));
}

// ============================================================================
// Numeric Edge Cases
// ============================================================================

#[test]
fn integers_and_floats_compare_numerically() {
    let compiled = compile(json!({"n": 1}));
    assert!(compiled.matches(&json!({"n": 1.0})));

    let compiled = compile(json!({"n": {"$gt": "2.5"}}));
    assert!(compiled.matches(&json!({"n": 3})));
    assert!(!compiled.matches(&json!({"n": "3"})));
}

#[test]
fn large_integers() {
    let compiled = compile(json!({"n": {"$lte": i64::MAX}}));
    assert!(compiled.matches(&json!({"n": 0})));
    assert!(compiled.matches(&json!({"n": i64::MIN})));
}

#[test]
fn non_numeric_comparison_operand_is_rejected() {
    let err = QuerySpec::parse(&json!({"n": {"$gt": "soon"}})).unwrap_err();
    assert!(matches!(err, Error::InvalidOperand { operator, field, .. } if operator == "$gt" && field == "n"));
}

// ============================================================================
// Selector Shape Edge Cases
// ============================================================================

#[test]
fn unknown_operators_name_the_field() {
    let err = QuerySpec::parse(&json!({"title": {"$regex": "^a"}})).unwrap_err();
    assert_eq!(
        err,
        Error::UnsupportedOperator {
            operator: "$regex".into(),
            field: "title".into()
        }
    );
}

#[test]
fn null_selector_matches_everything() {
    let compiled = QuerySpec::parse(&Value::Null).unwrap().compile();
    assert_eq!(compiled.filter.sql, "TRUE");
    assert!(compiled.matches(&json!({"anything": 1})));
}

#[test]
fn deeply_nested_paths() {
    let compiled = compile(json!({"a.b.c.d.e": {"$exists": true}}));
    assert!(compiled.matches(&json!({"a": {"b": {"c": {"d": {"e": null}}}}})));
    assert!(!compiled.matches(&json!({"a": {"b": {"c": {"d": {}}}}})));
}

#[test]
fn empty_path_segments_are_rejected() {
    assert!(FieldPath::parse("a..b").is_err());
    assert!(QuerySpec::parse(&json!({"": 1})).is_err());
}

#[test]
fn literal_object_equality() {
    let compiled = compile(json!({"meta": {"k": 1, "j": [true]}}));
    assert!(compiled.matches(&json!({"meta": {"j": [true], "k": 1.0}})));
    assert!(!compiled.matches(&json!({"meta": {"j": [true]}})));
}

// ============================================================================
// Sort Edge Cases
// ============================================================================

#[test]
fn sort_mixed_types_follows_jsonb_order() {
    let compiled = QuerySpec::all()
        .sort_by(FieldPath::parse("v").unwrap(), Direction::Asc)
        .compile();
    let mut rows: Vec<StoredRow> = [
        ("obj", json!({"v": {"a": 1}})),
        ("arr", json!({"v": [1]})),
        ("bool", json!({"v": false})),
        ("num", json!({"v": 10})),
        ("str", json!({"v": "z"})),
        ("null", json!({"v": null})),
        ("missing", json!({})),
    ]
    .into_iter()
    .map(|(id, data)| StoredRow::new(id, doc(data)))
    .collect();

    rows.sort_by(|a, b| compiled.compare(a, b));
    let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, ["null", "str", "num", "bool", "arr", "obj", "missing"]);
}

#[test]
fn mango_limit_zero_means_unlimited() {
    let query: MangoQuery = serde_json::from_value(json!({"selector": {}, "limit": 0})).unwrap();
    let compiled = QuerySpec::from_mango(&query).unwrap().compile();
    assert_eq!(compiled.limit, None);
    assert_eq!(compiled.page_clause(), "");
}

// ============================================================================
// Write Classification Edge Cases
// ============================================================================

#[test]
fn composite_keys_build_ids() {
    let schema: CollectionSchema = serde_json::from_value(json!({
        "version": 0,
        "primaryKey": {"key": "id", "fields": ["owner", "seq"], "separator": ":"}
    }))
    .unwrap();
    let key = schema.primary_key().unwrap();

    let rows = vec![WriteRow::insert(doc(json!({"id": "ada:1", "owner": "ada", "seq": 1})))];
    let result = categorize(key, &HashMap::new(), rows, "").unwrap();
    assert_eq!(result.writes[0].row.id, "ada:1");
}

#[test]
fn same_id_twice_in_one_batch() {
    let key = PrimaryKey::Field("id".into());
    let current = doc(json!({"id": "a", "_rev": "1-a"}));
    let stored = HashMap::from([("a".to_string(), current.clone())]);
    let rows = vec![
        WriteRow::update(doc(json!({"id": "a", "_rev": "2-b"})), current.clone()),
        WriteRow::update(doc(json!({"id": "a", "_rev": "2-c"})), current),
    ];

    // Both pass classification; the conditional update decides the winner.
    let result = categorize(&key, &stored, rows, "").unwrap();
    assert_eq!(result.writes.len(), 2);
    assert!(result.writes.iter().all(|w| w.kind == WriteKind::Update));
    assert!(result
        .writes
        .iter()
        .all(|w| w.expected_revision.as_deref() == Some("1-a")));
}

#[test]
fn missing_revisions_compare_equal() {
    let key = PrimaryKey::Field("id".into());
    let current = doc(json!({"id": "a"}));
    let stored = HashMap::from([("a".to_string(), current.clone())]);
    let rows = vec![WriteRow::update(doc(json!({"id": "a", "v": 2})), current)];

    let result = categorize(&key, &stored, rows, "").unwrap();
    assert_eq!(result.writes[0].expected_revision, None);
}
