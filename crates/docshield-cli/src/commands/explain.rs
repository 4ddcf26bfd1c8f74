//! Explain the restrictions of one request.

use super::RequestArgs;
use crate::style::{print_info_table, print_restriction, print_spacer, print_warn};
use anyhow::{Result, anyhow};
use docshield_config::DocshieldConfig;
use docshield_privileges::{
    DlsRestrictionView, FieldMaskingRule, FlsRule, PrivilegesEvaluationError,
};
use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Explanation<'a> {
    index: &'a str,
    user: &'a str,
    roles: &'a [String],
    generation: &'a str,
    dls: DlsRestrictionView,
    fls: RuleView<'a>,
    masking: RuleView<'a>,
    authz_hash: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RuleView<'a> {
    is_unrestricted: bool,
    /// One list per contributing permission entry.
    patterns: Vec<Vec<&'a str>>,
}

impl<'a> RuleView<'a> {
    fn fls(rule: &'a FlsRule) -> Self {
        Self {
            is_unrestricted: rule.is_unrestricted(),
            patterns: rule
                .pattern_lists()
                .into_iter()
                .map(|list| list.iter().map(String::as_str).collect())
                .collect(),
        }
    }

    fn masking(rule: &'a FieldMaskingRule) -> Self {
        Self {
            is_unrestricted: rule.is_unrestricted(),
            patterns: rule.expression_lists(),
        }
    }
}

pub fn run(config: &DocshieldConfig, request: &RequestArgs, index: &str, json: bool) -> Result<()> {
    let generation = request.generation(config)?;
    let meta = request.meta(config)?;
    let context = request.context();

    let evaluation = |e: PrivilegesEvaluationError| anyhow!("Evaluation failed: {e}");
    let dls = generation.dls_restriction(&context, &meta, index).map_err(evaluation)?;
    let fls = generation.fls_rule(&context, &meta, index).map_err(evaluation)?;
    let masking = generation.masking_rule(&context, &meta, index).map_err(evaluation)?;
    let hash = generation.authz_hash(&context, &meta, [index]).map_err(evaluation)?;

    let explanation = Explanation {
        index,
        user: &request.user,
        roles: &request.roles,
        generation: generation.fingerprint(),
        dls: dls.view(),
        fls: RuleView::fls(&fls),
        masking: RuleView::masking(&masking),
        authz_hash: hash.into_string(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&explanation)?);
        return Ok(());
    }

    if !meta.contains_index(index) {
        print_warn(&format!("Index '{index}' is not in the metadata snapshot"));
    }

    let roles = request.roles.join(", ");
    print_info_table(&[
        ("Index", index),
        ("User", request.user.as_str()),
        ("Roles", roles.as_str()),
        ("Generation", explanation.generation),
        ("Authz hash", explanation.authz_hash.as_str()),
    ]);
    print_spacer();

    print_restriction(
        "Document-level security",
        "any of",
        explanation.dls.is_unrestricted,
        explanation.dls.queries.iter().map(ToString::to_string),
    );
    print_rule("Field-level security", "fields", &explanation.fls);
    print_rule("Field masking", "masked", &explanation.masking);
    Ok(())
}

fn print_rule(title: &str, label: &str, view: &RuleView<'_>) {
    print_restriction(
        title,
        label,
        view.is_unrestricted,
        view.patterns.iter().map(|patterns| patterns.join(", ")),
    );
}
