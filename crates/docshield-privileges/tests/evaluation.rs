//! End-to-end evaluation against the role and metadata fixtures.

use docshield_config::DocshieldConfig;
use docshield_privileges::{
    DlsRestriction, Generation, MetaGraph, PrivilegesEvaluationContext,
    PrivilegesEvaluationError, Query, RolesDocument, User, validate_roles,
};
use serde_json::{Value, json};
use test_case::test_case;

fn roles() -> RolesDocument {
    toml::from_str(include_str!("fixtures/roles.toml")).unwrap()
}

fn meta() -> MetaGraph {
    serde_json::from_str(include_str!("fixtures/metadata.json")).unwrap()
}

fn generation() -> Generation {
    Generation::build(&roles(), &DocshieldConfig::default()).unwrap()
}

fn user(name: &str, attributes: &[(&str, Value)]) -> User {
    attributes
        .iter()
        .fold(User::new(name), |user, (key, value)| user.with_attribute(*key, value.clone()))
}

fn ctx(user: User, roles: &[&str]) -> PrivilegesEvaluationContext {
    PrivilegesEvaluationContext::new(user, roles.iter().copied())
}

fn jane(roles: &[&str]) -> PrivilegesEvaluationContext {
    ctx(
        user("jane", &[("dept", json!("sales")), ("team", json!("web")), ("hosts", json!(["a", "b"]))]),
        roles,
    )
}

// ============================================================================
// Fixtures
// ============================================================================

#[test]
fn test_fixture_document_is_valid() {
    assert!(validate_roles(&roles(), &DocshieldConfig::default()).is_ok());
    assert_eq!(meta().version(), 7);
}

// ============================================================================
// Document-level security
// ============================================================================

#[test]
fn test_templated_dls_for_own_department() {
    let restriction = generation()
        .dls_restriction(&jane(&["hr_reader"]), &meta(), "hr-eu")
        .unwrap();
    assert_eq!(
        *restriction,
        DlsRestriction::from_queries([Query::from_json(json!({"term": {"dept": "sales"}}))])
    );
}

#[test]
fn test_negated_pattern_excludes_index() {
    let restriction = generation()
        .dls_restriction(&jane(&["hr_reader"]), &meta(), "hr-audit")
        .unwrap();
    assert!(restriction.is_unrestricted());
}

#[test]
fn test_alias_grant_combines_with_index_grant() {
    let restriction = generation()
        .dls_restriction(&jane(&["hr_reader", "hr_auditor"]), &meta(), "hr-us")
        .unwrap();
    assert_eq!(restriction.queries().count(), 2);

    let view = serde_json::to_value(restriction.view()).unwrap();
    assert_eq!(view["isUnrestricted"], json!(false));
    assert!(view["queries"].as_array().unwrap().contains(&json!({"term": {"audited": true}})));
}

#[test]
fn test_all_access_lifts_restrictions() {
    let generation = generation();
    let context = jane(&["hr_reader", "hr_auditor", "all_access"]);
    let meta = meta();

    assert!(generation.dls_restriction(&context, &meta, "hr-eu").unwrap().is_unrestricted());
    assert!(generation.fls_rule(&context, &meta, "hr-eu").unwrap().is_unrestricted());
    assert!(generation.masking_rule(&context, &meta, "hr-eu").unwrap().is_unrestricted());
}

#[test]
fn test_data_stream_grant_with_list_attribute() {
    let generation = generation();
    let meta = meta();

    let restriction = generation
        .dls_restriction(&jane(&["metrics_team"]), &meta, ".ds-metrics-web-000002")
        .unwrap();
    assert_eq!(
        restriction.queries().next(),
        Some(&Query::from_json(json!({"terms": {"host": ["a", "b"]}})))
    );

    let other_team = generation
        .dls_restriction(&jane(&["metrics_team"]), &meta, ".ds-metrics-db-000001")
        .unwrap();
    assert!(other_team.is_unrestricted());
}

#[test]
fn test_missing_attribute_fails_closed() {
    let result = generation().dls_restriction(
        &ctx(User::new("anon"), &["metrics_team"]),
        &meta(),
        ".ds-metrics-db-000001",
    );
    assert_eq!(
        result.unwrap_err(),
        PrivilegesEvaluationError::MissingAttribute {
            role: "metrics_team".into(),
            attribute: "team".into(),
        }
    );
}

#[test]
fn test_multi_index_map() {
    let map = generation()
        .dls_restrictions(&jane(&["hr_reader"]), &meta(), ["hr-eu", "hr-audit", "objects"])
        .unwrap();
    assert_eq!(map.iter().map(|(index, _)| index).collect::<Vec<_>>(), vec!["hr-eu"]);
}

#[test]
fn test_unknown_index() {
    let restriction = generation()
        .dls_restriction(&jane(&["all_access"]), &meta(), "ghost")
        .unwrap();
    assert_eq!(*restriction, DlsRestriction::full());
}

// ============================================================================
// Field-level security
// ============================================================================

#[test_case("object", true; "object")]
#[test_case("object_top_secret", false; "top secret")]
#[test_case("object.child", false; "child")]
#[test_case("object.child.grandchild", true; "grandchild")]
#[test_case("object.child.grandchild.leaf", false; "leaf")]
#[test_case("object.child.grandchild.other", true; "grandchild sibling of leaf")]
#[test_case("object.child.other", false; "child sibling of grandchild")]
fn test_hierarchical_fls(path: &str, allowed: bool) {
    let rule = generation()
        .fls_rule(&jane(&["object_reader"]), &meta(), "objects")
        .unwrap();
    assert_eq!(rule.is_allowed_recursive(path), allowed);
}

#[test]
fn test_excluded_fields_and_keyword_subfields() {
    let rule = generation()
        .fls_rule(&jane(&["hr_reader"]), &meta(), "hr-eu")
        .unwrap();
    assert!(rule.is_allowed_recursive("name"));
    assert!(!rule.is_allowed_recursive("salary"));
    assert!(!rule.is_allowed_recursive("salary.keyword"));
    assert!(!rule.is_allowed_recursive("bank.account"));
    assert!(rule.is_object_allowed_assuming_parents_are_allowed("bank"));
}

#[test]
fn test_fls_union_across_roles() {
    let rule = generation()
        .fls_rule(&jane(&["hr_reader", "hr_auditor"]), &meta(), "hr-eu")
        .unwrap();
    assert!(rule.is_allowed_recursive("salary"));
}

// ============================================================================
// Field masking
// ============================================================================

#[test]
fn test_masking_single_role() {
    let rule = generation()
        .masking_rule(&jane(&["hr_reader"]), &meta(), "hr-eu")
        .unwrap();

    assert_eq!(rule.get("ssn").unwrap().apply_str("123").len(), 64);
    assert_eq!(rule.get("email").unwrap().apply_str("jane@example.com"), "***@example.com");
    assert!(rule.get("name").is_none());
}

#[test]
fn test_masking_intersection_across_roles() {
    let rule = generation()
        .masking_rule(&jane(&["hr_reader", "hr_auditor"]), &meta(), "hr-eu")
        .unwrap();

    // Both mask ssn.
    assert_eq!(rule.get("ssn").unwrap().apply_str("123").len(), 128);
    // The auditor sees email unmasked.
    assert!(rule.get("email").is_none());
}

// ============================================================================
// Authz hash
// ============================================================================

#[test]
fn test_hash_follows_template_values() {
    let generation = generation();
    let meta = meta();
    let hash = |context: &PrivilegesEvaluationContext| {
        generation.authz_hash(context, &meta, ["hr-eu", "hr-us"]).unwrap()
    };

    let sales_a = ctx(user("a", &[("dept", json!("sales"))]), &["hr_reader"]);
    let sales_b = ctx(user("b", &[("dept", json!("sales"))]), &["hr_reader"]);
    let support = ctx(user("c", &[("dept", json!("support"))]), &["hr_reader"]);

    assert_eq!(hash(&sales_a), hash(&sales_b));
    assert_ne!(hash(&sales_a), hash(&support));
    assert!(hash(&sales_a).is_digest());
}

#[test]
fn test_hash_skips_entries_blocked_by_missing_attributes() {
    let generation = generation();
    let meta = meta();
    let anonymous = ctx(User::new("anon"), &["metrics_team"]);
    let nobody = ctx(User::new("anon"), &[]);

    assert_eq!(
        generation.authz_hash(&anonymous, &meta, [".ds-metrics-db-000001"]).unwrap(),
        generation.authz_hash(&nobody, &meta, [".ds-metrics-db-000001"]).unwrap()
    );
}

#[test]
fn test_hash_changes_with_generation() {
    let meta = meta();
    let context = jane(&["hr_reader"]);
    let before = generation().authz_hash(&context, &meta, ["hr-eu"]).unwrap();

    let mut config = DocshieldConfig::default();
    config.masking.prefix = Some("x:".into());
    let after = Generation::build(&roles(), &config)
        .unwrap()
        .authz_hash(&context, &meta, ["hr-eu"])
        .unwrap();
    assert_ne!(before, after);
}
