mod support;

use logmask::fields::{FieldClass, FieldEntry};
use logmask::preview::{align_preview, build_preview_configs, preview_capacity, PreviewRule};
use logmask::rules::{ChangeState, RuleState};
use support::binding;

fn field(name: &str, class: FieldClass, rules: Vec<logmask::rules::RuleBinding>) -> FieldEntry {
    let mut entry = FieldEntry::new(name, class);
    entry.rules = rules;
    entry
}

#[test]
fn fields_without_active_rules_are_not_submitted() {
    let mut disabled_rule = binding(1, "a");
    disabled_rule.disabled = true;
    let fields = vec![
        field("user_id", FieldClass::Cleaned, vec![disabled_rule]),
        field("path", FieldClass::Cleaned, vec![]),
        field("ip", FieldClass::Cleaned, vec![binding(2, "b")]),
    ];
    let configs = build_preview_configs(&fields);
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].field_name, "ip");
}

#[test]
fn disabled_rules_are_filtered_from_submitted_fields() {
    let mut off = binding(1, "a");
    off.disabled = true;
    let fields = vec![field("ip", FieldClass::Cleaned, vec![off, binding(2, "b")])];
    let configs = build_preview_configs(&fields);
    assert_eq!(configs[0].rules, vec![PreviewRule::ById { rule_id: 2 }]);
}

#[test]
fn drifted_unaccepted_rules_are_submitted_inline_with_stored_definition() {
    let mut drifted = binding(5, "stored-pattern");
    drifted.state = RuleState::Update;
    drifted.new_rule = Some(support::def(5, "server-pattern"));
    let fields = vec![field("user_id", FieldClass::Cleaned, vec![drifted])];

    let configs = build_preview_configs(&fields);
    match &configs[0].rules[0] {
        PreviewRule::Inline { match_pattern, .. } => {
            assert_eq!(match_pattern, "stored-pattern", "pending new_rule must not leak");
        }
        other => panic!("expected inline submission, got {:?}", other),
    }
}

#[test]
fn accepted_rules_go_back_to_submission_by_id() {
    let mut accepted = binding(5, "server-pattern");
    accepted.state = RuleState::Update;
    accepted.change_state = ChangeState::Update;
    let fields = vec![field("user_id", FieldClass::Cleaned, vec![accepted])];

    let configs = build_preview_configs(&fields);
    assert_eq!(configs[0].rules, vec![PreviewRule::ById { rule_id: 5 }]);
}

#[test]
fn alignment_zips_origins_with_null_filtered_masked_values() {
    let f = field("user_id", FieldClass::Cleaned, vec![binding(1, "a"), binding(2, "b")]);
    let origins = vec!["u-1".to_string(), "u-2".to_string()];
    let masked = vec![None, Some("u-*".to_string()), Some("x-*".to_string())];
    let pairs = align_preview(&f, Some(&origins), &masked);
    assert_eq!(pairs.len(), 2);
    assert_eq!(pairs[0].origin, "u-1");
    assert_eq!(pairs[0].masked, "u-*");
    assert_eq!(pairs[1].masked, "x-*");
}

#[test]
fn alignment_is_empty_when_field_absent_from_samples() {
    let f = field("user_id", FieldClass::Cleaned, vec![binding(1, "a")]);
    let masked = vec![Some("u-*".to_string())];
    assert!(align_preview(&f, None, &masked).is_empty());
}

#[test]
fn preview_never_exceeds_rule_count() {
    let f = field("user_id", FieldClass::Cleaned, vec![binding(1, "a")]);
    let origins = vec!["u-1".to_string(), "u-2".to_string(), "u-3".to_string()];
    let masked = vec![Some("m1".to_string()), Some("m2".to_string()), Some("m3".to_string())];
    let pairs = align_preview(&f, Some(&origins), &masked);
    assert_eq!(pairs.len(), 1);
}

#[test]
fn ruleless_origin_field_keeps_one_synthetic_slot() {
    let f = field("log", FieldClass::OriginLog, vec![]);
    assert_eq!(preview_capacity(&f), 1);
    let origins = vec!["raw line".to_string(), "other".to_string()];
    let masked = vec![Some("masked line".to_string()), Some("masked other".to_string())];
    let pairs = align_preview(&f, Some(&origins), &masked);
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].masked, "masked line");
}

#[test]
fn missing_masked_values_pair_with_empty_strings() {
    let f = field("user_id", FieldClass::Cleaned, vec![binding(1, "a"), binding(2, "b")]);
    let origins = vec!["u-1".to_string(), "u-2".to_string()];
    let masked = vec![Some("u-*".to_string())];
    let pairs = align_preview(&f, Some(&origins), &masked);
    assert_eq!(pairs[1].masked, "");
}
