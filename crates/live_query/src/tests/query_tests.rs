use super::*;
use serde_json::json;

fn donations() -> Vec<Value> {
    vec![
        json!({"_id": "c", "amountRemaining": "0", "status": "Waiting", "createdAt": "2018-03-03T00:00:00Z"}),
        json!({"_id": "a", "amountRemaining": "3000000000000000000", "status": "Waiting", "createdAt": "2018-03-02T00:00:00Z"}),
        json!({"_id": "b", "amountRemaining": "2000000000000000000", "status": "Committed", "createdAt": "2018-03-01T00:00:00Z"}),
        json!({"_id": "d", "amountRemaining": "5", "status": "Waiting", "createdAt": "2018-03-01T00:00:00Z"}),
    ]
}

#[test]
fn not_equal_compares_numeric_strings_numerically() {
    let query = Query::new().ne("amountRemaining", 0);
    let ids: Vec<_> = query
        .apply(donations().iter())
        .into_iter()
        .map(|d| d["_id"].clone())
        .collect();
    assert_eq!(ids, vec![json!("a"), json!("b"), json!("d")]);
}

#[test]
fn ascending_sort_is_stable_for_equal_keys() {
    let query = Query::new().sort_ascending("createdAt");
    let ids: Vec<_> = query
        .apply(donations().iter())
        .into_iter()
        .map(|d| d["_id"].clone())
        .collect();
    assert_eq!(ids, vec![json!("b"), json!("d"), json!("a"), json!("c")]);
}

#[test]
fn later_sort_keys_break_ties_of_earlier_ones() {
    let query = Query::new()
        .sort_ascending("createdAt")
        .sort_ascending("amountRemaining");
    assert_eq!(query.sort, ["createdAt", "amountRemaining"]);
    let ids: Vec<_> = query
        .apply(donations().iter())
        .into_iter()
        .map(|d| d["_id"].clone())
        .collect();
    assert_eq!(ids, vec![json!("d"), json!("b"), json!("a"), json!("c")]);
}

#[test]
fn greater_than_matches_numbers_against_string_sentinel() {
    let docs = [
        json!({"_id": "x", "delegateId": 0}),
        json!({"_id": "y", "delegateId": 7}),
        json!({"_id": "z"}),
    ];
    let query = Query::new().gt("delegateId", "0");
    let matched = query.apply(docs.iter());
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0]["_id"], json!("y"));
}

#[test]
fn missing_fields_count_as_not_equal() {
    let doc = json!({"_id": "x"});
    assert!(Query::new().ne("status", "Waiting").matches(&doc));
    assert!(!Query::new().eq("status", "Waiting").matches(&doc));
}

#[test]
fn projection_keeps_only_selected_fields() {
    let doc = json!({"_id": "x", "title": "t", "secret": 1});
    let projected = Query::new().select(["_id", "title", "absent"]).apply([&doc]);
    assert_eq!(projected, vec![json!({"_id": "x", "title": "t"})]);
}

#[test]
fn combined_filters_all_apply() {
    let query = Query::new()
        .eq("status", "Waiting")
        .ne("amountRemaining", 0)
        .lt("amountRemaining", "10")
        .sort_ascending("createdAt");
    let matched = query.apply(donations().iter());
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0]["_id"], json!("d"));
}
