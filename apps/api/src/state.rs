use std::sync::Arc;

use crate::config::Config;
use crate::proposal::composer::ProposalComposer;
use crate::proposal::store::ProposalSource;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Where stored proposals are read from. `PgProposalStore` in production.
    pub source: Arc<dyn ProposalSource>,
    /// Carries the drafting transform when one is configured.
    pub composer: ProposalComposer,
}
