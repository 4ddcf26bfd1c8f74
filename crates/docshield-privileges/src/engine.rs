//! The long-lived entry point holding the current generation.

use crate::error::ValidationErrors;
use crate::generation::Generation;
use crate::query::{JsonQueryParser, QueryParser};
use crate::roles::RolesDocument;
use arc_swap::ArcSwap;
use docshield_config::DocshieldConfig;
use std::sync::Arc;
use tracing::{info, warn};

/// Serves privilege evaluation from the current configuration generation.
///
/// Readers take a snapshot with [`current`](Self::current) and keep using it
/// for the whole request; [`reload`](Self::reload) swaps in a new generation
/// without blocking them.
#[derive(Debug)]
pub struct PrivilegesEngine {
    current: ArcSwap<Generation>,
    config: DocshieldConfig,
    parser: Arc<dyn QueryParser>,
}

impl PrivilegesEngine {
    /// Builds the first generation from `document`.
    pub fn new(document: &RolesDocument, config: DocshieldConfig) -> Result<Self, ValidationErrors> {
        Self::with_parser(document, config, Arc::new(JsonQueryParser))
    }

    /// Like [`new`](Self::new), parsing DLS bodies with `parser`.
    pub fn with_parser(
        document: &RolesDocument,
        config: DocshieldConfig,
        parser: Arc<dyn QueryParser>,
    ) -> Result<Self, ValidationErrors> {
        let generation = Generation::build_with_parser(document, &config, Arc::clone(&parser))?;
        info!(
            roles = document.len(),
            fingerprint = %generation.fingerprint(),
            "Privileges engine started"
        );
        Ok(Self {
            current: ArcSwap::from_pointee(generation),
            config,
            parser,
        })
    }

    /// Snapshot of the current generation.
    pub fn current(&self) -> Arc<Generation> {
        self.current.load_full()
    }

    /// Compiles `document` and makes it current.
    ///
    /// On error the current generation stays in place.
    pub fn reload(&self, document: &RolesDocument) -> Result<Arc<Generation>, ValidationErrors> {
        let generation =
            match Generation::build_with_parser(document, &self.config, Arc::clone(&self.parser)) {
                Ok(generation) => Arc::new(generation),
                Err(errors) => {
                    warn!(
                        errors = errors.len(),
                        fingerprint = %self.current.load().fingerprint(),
                        "Rejected role configuration, keeping current generation"
                    );
                    return Err(errors);
                }
            };

        let previous = self.current.swap(Arc::clone(&generation));
        info!(
            previous = %previous.fingerprint(),
            current = %generation.fingerprint(),
            "Swapped role configuration generation"
        );
        Ok(generation)
    }

    pub fn config(&self) -> &DocshieldConfig {
        &self.config
    }
}
