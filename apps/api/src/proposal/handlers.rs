use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::proposal::composer::{ComposedProposal, ExportedProposal, OutputTarget};
use crate::proposal::models::ProposalDocument;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    /// Restricts the lookup to one partner's proposals.
    pub partner_id: Option<Uuid>,
    /// Run the AI drafting pass. Defaults to on when drafting is configured.
    pub draft: Option<bool>,
}

/// GET /api/v1/proposals/:id/export-pdf
///
/// Streams the composed PDF as an attachment.
pub async fn handle_export_pdf(
    State(state): State<AppState>,
    Path(proposal_id): Path<Uuid>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, AppError> {
    let row = state
        .source
        .fetch(proposal_id, query.partner_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Proposal {proposal_id} not found")))?;
    let doc = row.into_document()?;

    info!(%proposal_id, partner_id = ?query.partner_id, "Exporting proposal PDF");
    let use_drafting = query.draft.unwrap_or(true) && state.config.ai_drafting_enabled;
    let composed = state.composer.compose(doc, use_drafting, OutputTarget::Blob).await?;
    pdf_response(composed)
}

#[derive(Debug, Deserialize)]
pub struct RenderQuery {
    #[serde(default)]
    pub draft: bool,
}

/// POST /api/v1/proposals/render
///
/// Composes a proposal supplied in the request body. Nothing is stored.
pub async fn handle_render(
    State(state): State<AppState>,
    Query(query): Query<RenderQuery>,
    Json(doc): Json<ProposalDocument>,
) -> Result<Response, AppError> {
    let use_drafting = query.draft && state.config.ai_drafting_enabled;
    let composed = state.composer.compose(doc, use_drafting, OutputTarget::Blob).await?;
    pdf_response(composed)
}

fn pdf_response(composed: ComposedProposal) -> Result<Response, AppError> {
    let ExportedProposal::Blob(bytes) = composed.output else {
        return Err(AppError::Render("composer returned a non-blob output".to_string()));
    };

    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", composed.filename))
        .map_err(|e| AppError::Render(format!("invalid attachment filename: {e}")))?;
    let length = bytes.len();

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/pdf")),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_LENGTH, HeaderValue::from(length)),
        ],
        Bytes::from(bytes),
    )
        .into_response())
}
