//! # docshield-privileges: document, field and value authorization
//!
//! Decides what a request may see inside the indices it is allowed to read:
//! - **Document-level security** (DLS): filter queries combined per request
//! - **Field-level security** (FLS): hierarchical field visibility
//! - **Field masking**: visible fields whose values are replaced by a digest
//!   or a substitution
//! - **Authz hash**: a stable token summarizing the effective restrictions,
//!   usable as a cache key
//!
//! Privileges accumulate: a role can only add access, never take away what
//! another active role grants.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  RolesDocument (TOML / JSON)                 │
//! └─────────────────┬───────────────────────────┘
//!                   │ compile, validate
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  PrivilegesEngine ── ArcSwap<Generation>     │
//! │  ├─ Pattern matcher + template rendering     │
//! │  ├─ Index resolver (aliases, data streams)   │
//! │  └─ Bounded memo tables                      │
//! └─────────────────┬───────────────────────────┘
//!                   │ context + metadata + index
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  DlsRestriction │ FlsRule │ FieldMaskingRule │
//! │  AuthzHash                                   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Combining roles
//!
//! | Restriction | One role without it        | Several restricting roles          |
//! |-------------|----------------------------|------------------------------------|
//! | DLS         | unrestricted               | union of the queries               |
//! | FLS         | every field visible        | field visible if any role allows   |
//! | Masking     | nothing masked             | masked only if every seeing role masks |
//!
//! ## Example
//!
//! ```
//! use docshield_config::DocshieldConfig;
//! use docshield_privileges::{
//!     MetaGraph, PermissionDefinition, PrivilegesEngine, PrivilegesEvaluationContext,
//!     RoleDefinition, RolesDocument, User,
//! };
//!
//! let roles = RolesDocument::new().with_role(
//!     "sales_reader",
//!     RoleDefinition::new().index_permission(
//!         PermissionDefinition::new(["sales_*"])
//!             .dls(r#"{"term": {"region": "${user.attrs.region}"}}"#)
//!             .fls(["~internal.*"])
//!             .masked_fields(["customer.email"]),
//!     ),
//! );
//! let engine = PrivilegesEngine::new(&roles, DocshieldConfig::default())?;
//!
//! let meta = MetaGraph::builder().index("sales_2024").build();
//! let context = PrivilegesEvaluationContext::new(
//!     User::new("jane").with_attribute("region", serde_json::json!("eu")),
//!     ["sales_reader"],
//! );
//!
//! let generation = engine.current();
//! let dls = generation.dls_restriction(&context, &meta, "sales_2024")?;
//! assert!(!dls.is_unrestricted());
//!
//! let fls = generation.fls_rule(&context, &meta, "sales_2024")?;
//! assert!(fls.is_allowed_recursive("customer.name"));
//! assert!(!fls.is_allowed_recursive("internal.notes"));
//!
//! let masking = generation.masking_rule(&context, &meta, "sales_2024")?;
//! assert!(masking.get("customer.email").is_some());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod context;
pub mod dls;
pub mod engine;
pub mod error;
pub mod fls;
pub mod generation;
pub mod hash;
pub mod masking;
pub mod meta;
pub mod pattern;
pub mod query;
pub mod resolver;
pub mod roles;
pub mod template;
pub mod validation;

mod memo;

// Re-export commonly used types
pub use context::{PrivilegesEvaluationContext, User};
pub use dls::{DlsRestriction, DlsRestrictionMap, DlsRestrictionView};
pub use engine::PrivilegesEngine;
pub use error::{
    ConfigurationError, EvaluationResult, PrivilegesEvaluationError, Result, ValidationErrors,
};
pub use fls::{FieldPatterns, FlsRule};
pub use generation::Generation;
pub use hash::AuthzHash;
pub use masking::{FieldMaskingRule, MaskingFunction};
pub use meta::{MetaGraph, MetaGraphDocument};
pub use query::{JsonQueryParser, Query, QueryParser};
pub use roles::{PermissionDefinition, PermissionScope, RoleDefinition, RolesDocument};
pub use validation::{validate_roles, validate_roles_with_parser};
