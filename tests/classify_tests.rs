mod support;

use std::collections::HashSet;

use logmask::fields::{classify_fields, field_class, FieldClass};
use support::spec;

fn built_in(names: &[&str]) -> HashSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[test]
fn partitions_into_three_ordered_buckets() {
    let specs = vec![
        spec("path", "keyword"),
        spec("log", "text"),
        spec("ts", "date"),
        spec("user_id", "keyword"),
    ];
    let entries = classify_fields(&specs, &built_in(&["ts"]));
    let classes: Vec<FieldClass> = entries.iter().map(|e| e.field_class).collect();
    assert_eq!(
        classes,
        vec![FieldClass::BuiltIn, FieldClass::Cleaned, FieldClass::Cleaned, FieldClass::OriginLog]
    );
    // Relative order within the cleaned bucket is the input order.
    assert_eq!(entries[1].field_name, "path");
    assert_eq!(entries[2].field_name, "user_id");
}

#[test]
fn origin_requires_both_name_and_text_type() {
    let none = built_in(&[]);
    assert_eq!(field_class("log", "text", &none), FieldClass::OriginLog);
    assert_eq!(field_class("log", "keyword", &none), FieldClass::Cleaned);
    assert_eq!(field_class("message", "text", &none), FieldClass::Cleaned);
}

#[test]
fn built_in_set_wins_over_origin_convention() {
    assert_eq!(field_class("log", "text", &built_in(&["log"])), FieldClass::BuiltIn);
}

#[test]
fn duplicate_names_dedup_last_write_wins() {
    let specs = vec![spec("user_id", "keyword"), spec("user_id", "long")];
    let entries = classify_fields(&specs, &built_in(&[]));
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].field_type, "long");
}
