// Proposal Document Composer: content model, drafting boundary, layout pass,
// content source and HTTP handlers.
pub mod composer;
pub mod currency;
pub mod drafting;
pub mod handlers;
pub mod models;
pub mod store;

pub use composer::{
    compose_document, resolve_content, ComposeError, ComposedProposal, ExportedProposal, Letterhead,
    OutputTarget, ProposalComposer,
};
pub use drafting::{DraftError, LlmDrafter, ProposalDrafter};
pub use models::{ContentError, ProposalContent, ProposalDocument};
pub use store::{PgProposalStore, ProposalSource};
