//! Configuration generations.
//!
//! A [`Generation`] is the compiled, immutable form of one role document plus
//! the settings it was built with. All evaluation operations run against a
//! generation, and everything they memoize lives and dies with it.

use crate::context::PrivilegesEvaluationContext;
use crate::dls::{self, DlsRestriction, DlsRestrictionMap};
use crate::error::{EvaluationResult, PrivilegesEvaluationError, ValidationErrors};
use crate::fls::FlsRule;
use crate::hash::{AuthzHash, CanonicalPolicy};
use crate::masking::{FieldMaskingRule, MaskingFunction, MaskingPart};
use crate::memo::BoundedMemo;
use crate::meta::MetaGraph;
use crate::query::{JsonQueryParser, QueryParser};
use crate::resolver::{applicable_permission_entries, candidates};
use crate::roles::{Compiler, PermissionEntry, Role, RolesDocument};
use docshield_config::{CacheConfig, DocshieldConfig, MaskingConfig};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Hex digits of the generation fingerprint.
const FINGERPRINT_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MemoKey {
    roles: BTreeSet<String>,
    index: String,
    /// Everything applicability reads from the snapshot.
    aliases: Vec<String>,
    data_streams: Vec<String>,
    /// Only set when the generation has templated roles.
    user: Option<String>,
}

/// One compiled role configuration.
#[derive(Debug)]
pub struct Generation {
    roles: BTreeMap<String, Role>,
    parser: Arc<dyn QueryParser>,
    masking: MaskingConfig,
    cache: CacheConfig,
    max_verbatim_len: usize,
    fingerprint: String,
    uses_templates: bool,
    dls_memo: BoundedMemo<MemoKey, Arc<DlsRestriction>>,
    fls_memo: BoundedMemo<MemoKey, Arc<FlsRule>>,
    masking_memo: BoundedMemo<MemoKey, Arc<FieldMaskingRule>>,
}

impl Generation {
    /// Compiles `document` with the JSON query parser.
    ///
    /// Fails with every configuration error found, keyed by role.
    pub fn build(
        document: &RolesDocument,
        config: &DocshieldConfig,
    ) -> Result<Self, ValidationErrors> {
        Self::build_with_parser(document, config, Arc::new(JsonQueryParser))
    }

    /// Compiles `document`, parsing DLS bodies with `parser`.
    pub fn build_with_parser(
        document: &RolesDocument,
        config: &DocshieldConfig,
        parser: Arc<dyn QueryParser>,
    ) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let generation = Self::compile(document, config, parser, &mut errors);
        errors.into_result(generation)
    }

    /// Compiles `document`, leaving defective entries out and recording
    /// their errors.
    pub(crate) fn compile(
        document: &RolesDocument,
        config: &DocshieldConfig,
        parser: Arc<dyn QueryParser>,
        errors: &mut ValidationErrors,
    ) -> Self {
        let (roles, patterns) = {
            let mut compiler = Compiler::new(parser.as_ref(), &config.masking);
            let roles: BTreeMap<String, Role> = document
                .roles()
                .iter()
                .map(|(name, definition)| {
                    (name.clone(), compiler.compile_role(name, definition, errors))
                })
                .collect();
            (roles, compiler.patterns.len())
        };

        let uses_templates = roles.values().any(Role::uses_templates);
        let fingerprint = fingerprint(document, &config.masking);
        let capacity = config.cache.restrictions;

        debug!(
            roles = roles.len(),
            patterns,
            uses_templates,
            fingerprint = %fingerprint,
            "Compiled role configuration"
        );

        Self {
            roles,
            parser,
            masking: config.masking.clone(),
            cache: config.cache.clone(),
            max_verbatim_len: config.authz_hash.max_verbatim_len,
            fingerprint,
            uses_templates,
            dls_memo: BoundedMemo::new(capacity),
            fls_memo: BoundedMemo::new(capacity),
            masking_memo: BoundedMemo::new(capacity),
        }
    }

    /// Short digest of the role document and masking settings.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn role(&self, name: &str) -> Option<&Role> {
        self.roles.get(name)
    }

    pub fn role_names(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(String::as_str)
    }

    /// True when any role uses `${...}` placeholders.
    pub fn uses_templates(&self) -> bool {
        self.uses_templates
    }

    pub fn masking_config(&self) -> &MaskingConfig {
        &self.masking
    }

    pub(crate) fn parser(&self) -> &dyn QueryParser {
        self.parser.as_ref()
    }

    /// Roles of the context known to this generation, sorted by name.
    fn active_roles<'g>(
        &'g self,
        context: &PrivilegesEvaluationContext,
    ) -> impl Iterator<Item = &'g Role> {
        context.roles().iter().filter_map(|name| {
            let role = self.roles.get(name);
            if role.is_none() {
                debug!(role = %name, "Ignoring unknown role");
            }
            role
        })
    }

    fn memo_key(
        &self,
        context: &PrivilegesEvaluationContext,
        meta: &MetaGraph,
        index: &str,
    ) -> MemoKey {
        MemoKey {
            roles: context.roles().clone(),
            index: index.to_string(),
            aliases: meta.aliases_of(index).to_vec(),
            data_streams: meta.data_streams_of(index).to_vec(),
            user: self
                .uses_templates
                .then(|| context.template_fingerprint()),
        }
    }

    /// Applicable entries of every active role, roles in name order.
    fn applicable<'g>(
        &'g self,
        context: &PrivilegesEvaluationContext,
        meta: &MetaGraph,
        index: &str,
    ) -> EvaluationResult<Vec<(&'g Role, &'g PermissionEntry)>> {
        let mut applicable = Vec::new();
        for role in self.active_roles(context) {
            let entries = applicable_permission_entries(context, role, meta, index)
                .inspect_err(|e| log_failure("applicable entries", index, e))?;
            applicable.extend(entries.into_iter().map(|entry| (role, entry)));
        }
        Ok(applicable)
    }

    // -----------------------------------------------------------------------
    // Document-level security
    // -----------------------------------------------------------------------

    /// The document filter for a request on `index`.
    ///
    /// An index missing from `meta` gets a filter matching nothing.
    pub fn dls_restriction(
        &self,
        context: &PrivilegesEvaluationContext,
        meta: &MetaGraph,
        index: &str,
    ) -> EvaluationResult<Arc<DlsRestriction>> {
        if !meta.contains_index(index) {
            warn!(index = %index, "Unknown index, no documents visible");
            return Ok(Arc::new(DlsRestriction::full()));
        }

        self.dls_memo
            .try_get_or_insert_with(self.memo_key(context, meta, index), || {
                let applicable = self.applicable(context, meta, index)?;
                let restriction = dls::combine(context, &applicable, self.parser())
                    .inspect_err(|e| log_failure("DLS", index, e))?;
                debug!(
                    index = %index,
                    roles = ?context.roles(),
                    unrestricted = restriction.is_unrestricted(),
                    queries = restriction.queries().count(),
                    "Computed DLS restriction"
                );
                Ok(Arc::new(restriction))
            })
    }

    /// DLS restrictions of a multi-index request.
    pub fn dls_restrictions<I, S>(
        &self,
        context: &PrivilegesEvaluationContext,
        meta: &MetaGraph,
        indices: I,
    ) -> EvaluationResult<DlsRestrictionMap>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut map = DlsRestrictionMap::default();
        for index in indices {
            let index = index.as_ref();
            map.insert(index, self.dls_restriction(context, meta, index)?);
        }
        Ok(map)
    }

    pub fn has_dls_restriction<I, S>(
        &self,
        context: &PrivilegesEvaluationContext,
        meta: &MetaGraph,
        indices: I,
    ) -> EvaluationResult<bool>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for index in indices {
            if !self
                .dls_restriction(context, meta, index.as_ref())?
                .is_unrestricted()
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // -----------------------------------------------------------------------
    // Field-level security
    // -----------------------------------------------------------------------

    /// The field visibility rule for a request on `index`.
    ///
    /// An index missing from `meta` gets a rule hiding every field.
    pub fn fls_rule(
        &self,
        context: &PrivilegesEvaluationContext,
        meta: &MetaGraph,
        index: &str,
    ) -> EvaluationResult<Arc<FlsRule>> {
        if !meta.contains_index(index) {
            warn!(index = %index, "Unknown index, no fields visible");
            return Ok(Arc::new(FlsRule::deny_all()));
        }

        self.fls_memo
            .try_get_or_insert_with(self.memo_key(context, meta, index), || {
                let applicable = self.applicable(context, meta, index)?;
                let rule = FlsRule::from_entries(
                    applicable.iter().map(|(_, entry)| entry.fls.as_ref()),
                    self.cache.field_decisions,
                );
                debug!(
                    index = %index,
                    roles = ?context.roles(),
                    unrestricted = rule.is_unrestricted(),
                    "Computed FLS rule"
                );
                Ok(Arc::new(rule))
            })
    }

    pub fn has_fls_restriction<I, S>(
        &self,
        context: &PrivilegesEvaluationContext,
        meta: &MetaGraph,
        indices: I,
    ) -> EvaluationResult<bool>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for index in indices {
            if !self
                .fls_rule(context, meta, index.as_ref())?
                .is_unrestricted()
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // -----------------------------------------------------------------------
    // Field masking
    // -----------------------------------------------------------------------

    /// The field masking rule for a request on `index`.
    ///
    /// An index missing from `meta` gets a rule masking every field with the
    /// default digest.
    pub fn masking_rule(
        &self,
        context: &PrivilegesEvaluationContext,
        meta: &MetaGraph,
        index: &str,
    ) -> EvaluationResult<Arc<FieldMaskingRule>> {
        if !meta.contains_index(index) {
            warn!(index = %index, "Unknown index, masking every field");
            return Ok(Arc::new(FieldMaskingRule::MaskAll(Arc::new(
                MaskingFunction::default_digest(&self.masking),
            ))));
        }

        self.masking_memo
            .try_get_or_insert_with(self.memo_key(context, meta, index), || {
                let parts = self
                    .applicable(context, meta, index)?
                    .into_iter()
                    .map(|(_, entry)| MaskingPart::new(entry.masks.clone(), entry.fls.clone()))
                    .collect();
                let rule = FieldMaskingRule::from_parts(parts);
                debug!(
                    index = %index,
                    roles = ?context.roles(),
                    unrestricted = rule.is_unrestricted(),
                    "Computed field masking rule"
                );
                Ok(Arc::new(rule))
            })
    }

    pub fn has_masking_restriction<I, S>(
        &self,
        context: &PrivilegesEvaluationContext,
        meta: &MetaGraph,
        indices: I,
    ) -> EvaluationResult<bool>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for index in indices {
            if !self
                .masking_rule(context, meta, index.as_ref())?
                .is_unrestricted()
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // -----------------------------------------------------------------------
    // Authz hash
    // -----------------------------------------------------------------------

    /// The authz hash of a request on `targets`.
    ///
    /// Entries whose applicability or DLS clause depends on a user attribute
    /// the user lacks are left out; any other evaluation error fails the
    /// whole computation.
    pub fn authz_hash<I, S>(
        &self,
        context: &PrivilegesEvaluationContext,
        meta: &MetaGraph,
        targets: I,
    ) -> EvaluationResult<AuthzHash>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut policy = CanonicalPolicy::new(&self.fingerprint);

        for index in targets {
            let index = index.as_ref();
            if !meta.contains_index(index) {
                policy.add_unknown_index(index);
                continue;
            }

            for role in self.active_roles(context) {
                for entry in role.entries() {
                    let names = candidates(entry.scope(), meta, index);
                    if names.is_empty() {
                        continue;
                    }
                    let added = match entry.selector().selects(role.name(), context, &names) {
                        Ok(true) => policy.add_entry(role, entry, context, self.parser())?,
                        Ok(false) => true,
                        Err(PrivilegesEvaluationError::MissingAttribute { .. }) => false,
                        Err(e) => {
                            log_failure("authz hash", index, &e);
                            return Err(e);
                        }
                    };
                    if !added {
                        debug!(
                            index = %index,
                            role = %role.name(),
                            "Skipping entry blocked by a missing user attribute"
                        );
                    }
                }
            }
        }

        let hash = policy.finish(self.max_verbatim_len);
        debug!(roles = ?context.roles(), digest = hash.is_digest(), "Computed authz hash");
        Ok(hash)
    }
}

fn log_failure(what: &str, index: &str, e: &PrivilegesEvaluationError) {
    error!(index = %index, role = %e.role(), error = %e, "{what} evaluation failed");
}

fn fingerprint(document: &RolesDocument, masking: &MaskingConfig) -> String {
    // Serializing maps with string keys cannot fail.
    let document = serde_json::to_string(document).unwrap_or_default();
    let masking = serde_json::to_string(masking).unwrap_or_default();

    let mut hasher = blake3::Hasher::new();
    hasher.update(document.as_bytes());
    hasher.update(&[0]);
    hasher.update(masking.as_bytes());
    hasher.finalize().to_hex().as_str()[..FINGERPRINT_LEN].to_string()
}
