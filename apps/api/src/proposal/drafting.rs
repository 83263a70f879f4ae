//! Optional AI drafting pass: rewrites proposal prose before composition.
//!
//! Drafting is best-effort. Every failure is a [`DraftError`] value that the
//! composer logs and then ignores, composing the original content instead.
//! The timeout is applied by the caller through [`draft_with_timeout`].

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::llm_client::prompts::{JSON_ONLY_SYSTEM, NUMERIC_FIDELITY_INSTRUCTION};
use crate::llm_client::{LlmClient, LlmError};
use crate::proposal::models::{ProposalContent, ProposalDocument};

/// Below this relative change in executive-summary length the draft is flagged
/// as probably unenhanced.
const MIN_SUMMARY_CHANGE: f64 = 0.15;

#[derive(Debug, Error)]
pub enum DraftError {
    #[error("drafting call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("drafted content is invalid: {0}")]
    InvalidStructure(String),

    #[error("drafting timed out after {0:?}")]
    TimedOut(Duration),
}

/// A content transform `document -> content'`.
///
/// Implementations must not be relied on to preserve amounts; the composer
/// re-asserts investment names and amounts after every successful draft.
#[async_trait]
pub trait ProposalDrafter: Send + Sync {
    async fn draft(&self, doc: &ProposalDocument) -> Result<ProposalContent, DraftError>;
}

/// Runs `drafter` bounded by `timeout`.
pub async fn draft_with_timeout(
    drafter: &dyn ProposalDrafter,
    doc: &ProposalDocument,
    timeout: Duration,
) -> Result<ProposalContent, DraftError> {
    match tokio::time::timeout(timeout, drafter.draft(doc)).await {
        Ok(result) => result,
        Err(_) => Err(DraftError::TimedOut(timeout)),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LlmDrafter
// ────────────────────────────────────────────────────────────────────────────

/// Drafter backed by the injected [`LlmClient`].
pub struct LlmDrafter {
    llm: LlmClient,
}

impl LlmDrafter {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl ProposalDrafter for LlmDrafter {
    async fn draft(&self, doc: &ProposalDocument) -> Result<ProposalContent, DraftError> {
        info!(proposal_id = %doc.id, "Drafting proposal content");
        let prompt = build_draft_prompt(doc);
        let raw: Value = self.llm.call_json(&prompt, JSON_ONLY_SYSTEM).await?;
        let drafted = parse_drafted(raw)?;

        let change = summary_change_ratio(&doc.content.executive_summary, &drafted.executive_summary);
        if change < MIN_SUMMARY_CHANGE {
            warn!(
                proposal_id = %doc.id,
                change = %format!("{:.1}%", change * 100.0),
                "Executive summary barely changed; draft may not be enhanced"
            );
        } else {
            info!(
                proposal_id = %doc.id,
                change = %format!("{:.1}%", change * 100.0),
                "Drafting completed"
            );
        }
        Ok(drafted)
    }
}

/// Checks the raw model output and converts it into content.
///
/// The model must return a non-empty `executiveSummary` and an array
/// `projectScope`; everything else falls back to serde defaults.
pub fn parse_drafted(raw: Value) -> Result<ProposalContent, DraftError> {
    let summary_ok = raw
        .get("executiveSummary")
        .and_then(Value::as_str)
        .is_some_and(|s| !s.trim().is_empty());
    if !summary_ok {
        return Err(DraftError::InvalidStructure(
            "missing executiveSummary".to_string(),
        ));
    }
    if !raw.get("projectScope").is_some_and(Value::is_array) {
        return Err(DraftError::InvalidStructure(
            "projectScope is not an array".to_string(),
        ));
    }
    serde_json::from_value(raw).map_err(|e| DraftError::InvalidStructure(e.to_string()))
}

/// Relative change in character count between two summaries.
pub fn summary_change_ratio(original: &str, drafted: &str) -> f64 {
    let before = original.chars().count() as f64;
    let after = drafted.chars().count() as f64;
    if before == 0.0 {
        return if after == 0.0 { 0.0 } else { 1.0 };
    }
    (after - before).abs() / before
}

/// Plain-text rendering of the proposal the model rewrites.
fn proposal_text(doc: &ProposalDocument) -> String {
    let content = &doc.content;
    let numbered = |items: Vec<String>| {
        items
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{}. {s}", i + 1))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let scope = numbered(content.project_scope.iter().map(|s| s.title()).collect());
    let timeline = content
        .timeline
        .iter()
        .map(|p| format!("- {}: {}\n  {}", p.period, p.title, p.description))
        .collect::<Vec<_>>()
        .join("\n\n");
    let investment = content
        .investment
        .iter()
        .map(|item| format!("- {}: {} {}\n  {}", item.name, doc.currency, item.amount, item.description))
        .collect::<Vec<_>>()
        .join("\n\n");
    let deliverables = numbered(content.deliverables.iter().map(|d| d.title()).collect());
    let terms = numbered(content.terms_and_conditions.clone());
    let stack = &content.technology_stack;

    format!(
        "PROPOSAL TITLE: {title}\nCLIENT: {client}\nCURRENCY: {currency}\n\n\
         EXECUTIVE SUMMARY:\n{summary}\n\n\
         PROJECT SCOPE:\n{scope}\n\n\
         PROJECT TIMELINE:\n{timeline}\n\n\
         INVESTMENT BREAKDOWN:\n{investment}\n\n\
         DELIVERABLES:\n{deliverables}\n\n\
         TECHNOLOGY STACK:\n- Frontend: {frontend}\n- Backend: {backend}\n- Infrastructure: {infra}\n\n\
         TERMS AND CONDITIONS:\n{terms}\n",
        title = doc.title,
        client = doc.client,
        currency = doc.currency,
        summary = content.executive_summary,
        frontend = stack.frontend,
        backend = stack.backend,
        infra = stack.infrastructure,
    )
}

fn build_draft_prompt(doc: &ProposalDocument) -> String {
    format!(
        "You are a senior business proposal writer. Rewrite the proposal below into a polished, \
         executive-grade document that a C-level reader would act on.\n\n\
         For every section:\n\
         1. Executive Summary: rewrite as 2-3 paragraphs that open with the opportunity, state the \
            value and business impact, and close with a call to action.\n\
         2. Project Scope: rewrite each item to be specific, measurable and value-focused.\n\
         3. Timeline: keep each period verbatim; give each phase a professional title and a \
            description of activities, deliverables and success criteria.\n\
         4. Investment: rewrite descriptions to explain what the client receives.\n\
         5. Deliverables: rewrite each to state the tangible outcome.\n\
         6. Technology Stack: explain why each choice supports the solution.\n\
         7. Terms and Conditions: rewrite in clear, standard contract language.\n\n\
         {NUMERIC_FIDELITY_INSTRUCTION}\n\n\
         Return ONLY a JSON object with keys executiveSummary (string), projectScope (array of \
         {{\"title\", \"description\"}}), timeline (array of {{\"period\", \"title\", \"description\"}}), \
         investment (array of {{\"name\", \"description\", \"amount\"}}), deliverables (array of \
         {{\"title\", \"description\"}}), technologyStack ({{\"frontend\", \"backend\", \"infrastructure\"}}) \
         and termsAndConditions (array of strings).\n\n\
         Original proposal:\n{}",
        proposal_text(doc)
    )
}
