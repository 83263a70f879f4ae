//! Content source: loads one stored proposal by id for export.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::errors::AppError;
use crate::proposal::models::{ContentError, ProposalContent, ProposalDocument, TechnologyStack};

/// Supplies proposals for export. Carried in `AppState` as `Arc<dyn ProposalSource>`.
#[async_trait]
pub trait ProposalSource: Send + Sync {
    /// Returns `None` when the proposal does not exist or is outside `partner_scope`.
    async fn fetch(
        &self,
        id: Uuid,
        partner_scope: Option<Uuid>,
    ) -> Result<Option<ProposalRow>, AppError>;
}

/// One row of the `proposals` table. Content columns are NULL until the
/// proposal has been generated.
#[derive(Debug, Clone, FromRow)]
pub struct ProposalRow {
    pub id: Uuid,
    pub partner_id: Uuid,
    pub title: String,
    pub client_name: String,
    pub currency: String,
    pub executive_summary: Option<String>,
    pub project_scope: Option<Value>,
    pub timeline_phases: Option<Value>,
    pub investment_items: Option<Value>,
    pub deliverables: Option<Value>,
    pub technology_stack: Option<Value>,
    pub terms_and_conditions: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl ProposalRow {
    /// Converts the row into a composer input.
    ///
    /// Fails with [`ContentError::NotGenerated`] when the executive summary is
    /// missing, so an ungenerated proposal is never composed. Malformed JSON in
    /// an optional column is treated as an empty section.
    pub fn into_document(self) -> Result<ProposalDocument, ContentError> {
        let id = self.id.to_string();
        let executive_summary = self
            .executive_summary
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ContentError::NotGenerated(id.clone()))?;

        let content = ProposalContent {
            executive_summary,
            project_scope: json_column(self.project_scope, "project_scope", &id),
            timeline: json_column(self.timeline_phases, "timeline_phases", &id),
            investment: json_column(self.investment_items, "investment_items", &id),
            deliverables: json_column(self.deliverables, "deliverables", &id),
            technology_stack: json_column::<TechnologyStack>(self.technology_stack, "technology_stack", &id),
            terms_and_conditions: json_column(self.terms_and_conditions, "terms_and_conditions", &id),
        };

        Ok(ProposalDocument {
            id,
            title: self.title,
            client: self.client_name,
            created_at: self.created_at.to_rfc3339(),
            currency: self.currency,
            content,
        })
    }
}

fn json_column<T: serde::de::DeserializeOwned + Default>(value: Option<Value>, column: &str, id: &str) -> T {
    match value {
        None | Some(Value::Null) => T::default(),
        Some(v) => serde_json::from_value(v).unwrap_or_else(|e| {
            tracing::warn!(proposal_id = %id, column, error = %e, "Malformed proposal column, rendering empty");
            T::default()
        }),
    }
}

/// Postgres-backed source.
pub struct PgProposalStore {
    db: PgPool,
}

impl PgProposalStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const SELECT_PROPOSAL: &str = "SELECT id, partner_id, title, client_name, currency, \
     executive_summary, project_scope, timeline_phases, investment_items, deliverables, \
     technology_stack, terms_and_conditions, created_at \
     FROM proposals WHERE id = $1 AND ($2::uuid IS NULL OR partner_id = $2)";

#[async_trait]
impl ProposalSource for PgProposalStore {
    async fn fetch(
        &self,
        id: Uuid,
        partner_scope: Option<Uuid>,
    ) -> Result<Option<ProposalRow>, AppError> {
        let row = sqlx::query_as::<_, ProposalRow>(SELECT_PROPOSAL)
            .bind(id)
            .bind(partner_scope)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    pub(crate) fn generated_row() -> ProposalRow {
        ProposalRow {
            id: Uuid::parse_str("0f6a7c52-2b1d-4e0a-9c55-3d2e1f0a9b8c").unwrap(),
            partner_id: Uuid::parse_str("11111111-2222-3333-4444-555555555555").unwrap(),
            title: "Pilot".to_string(),
            client_name: "Acme".to_string(),
            currency: "USD".to_string(),
            executive_summary: Some("Short pilot.".to_string()),
            project_scope: Some(json!(["Build MVP"])),
            timeline_phases: Some(json!([{"period": "Week 1", "title": "Build", "description": "Build it"}])),
            investment_items: Some(json!([{"name": "Dev", "description": "Dev work", "amount": 5000}])),
            deliverables: Some(json!([{"title": "Working demo", "description": "Hosted"}])),
            technology_stack: Some(json!({"frontend": "React", "backend": "Node", "infrastructure": "AWS"})),
            terms_and_conditions: Some(json!(["Net 30"])),
            created_at: Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_row_converts_to_document() {
        let doc = generated_row().into_document().unwrap();
        assert_eq!(doc.id, "0f6a7c52-2b1d-4e0a-9c55-3d2e1f0a9b8c");
        assert_eq!(doc.client, "Acme");
        assert_eq!(doc.reference_code(), "PROP-0A9B8C");
        assert_eq!(doc.content.investment[0].amount, 5000.0);
        assert_eq!(doc.content.technology_stack.infrastructure, "AWS");
        assert!(doc.created_at.starts_with("2026-10-18T09:00:00"));
    }

    #[test]
    fn test_ungenerated_row_is_rejected() {
        let mut row = generated_row();
        row.executive_summary = None;
        assert!(matches!(row.into_document(), Err(ContentError::NotGenerated(_))));
    }

    #[test]
    fn test_null_and_malformed_columns_render_empty() {
        let mut row = generated_row();
        row.timeline_phases = None;
        row.investment_items = Some(json!("not a list"));
        row.technology_stack = Some(Value::Null);
        let doc = row.into_document().unwrap();
        assert!(doc.content.timeline.is_empty());
        assert!(doc.content.investment.is_empty());
        assert_eq!(doc.content.technology_stack, TechnologyStack::default());
    }
}
