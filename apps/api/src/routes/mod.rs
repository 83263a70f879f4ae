pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::proposal::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route(
            "/api/v1/proposals/:id/export-pdf",
            get(handlers::handle_export_pdf),
        )
        .route("/api/v1/proposals/render", post(handlers::handle_render))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::response::IntoResponse;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::config::Config;
    use crate::errors::{AppError, EXPORT_FAILED_MESSAGE};
    use crate::proposal::composer::{Letterhead, ProposalComposer};
    use crate::proposal::store::tests::generated_row;
    use crate::proposal::store::{ProposalRow, ProposalSource};

    struct InMemorySource {
        rows: Vec<ProposalRow>,
    }

    #[async_trait]
    impl ProposalSource for InMemorySource {
        async fn fetch(
            &self,
            id: Uuid,
            partner_scope: Option<Uuid>,
        ) -> Result<Option<ProposalRow>, AppError> {
            Ok(self
                .rows
                .iter()
                .find(|row| row.id == id && partner_scope.map_or(true, |p| p == row.partner_id))
                .cloned())
        }
    }

    fn app() -> Router {
        let mut ungenerated = generated_row();
        ungenerated.id = Uuid::parse_str("22222222-0000-0000-0000-000000000001").unwrap();
        ungenerated.executive_summary = None;

        build_router(AppState {
            config: Config::for_tests(),
            source: Arc::new(InMemorySource {
                rows: vec![generated_row(), ungenerated],
            }),
            composer: ProposalComposer::new(Letterhead::default()),
        })
    }

    async fn get(uri: &str) -> axum::response::Response {
        app()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = get("/health").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["drafting"], false);
    }

    #[tokio::test]
    async fn test_export_pdf_returns_attachment() {
        let response = get("/api/v1/proposals/0f6a7c52-2b1d-4e0a-9c55-3d2e1f0a9b8c/export-pdf").await;
        assert_eq!(response.status(), StatusCode::OK);

        let headers = response.headers().clone();
        assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"Proposal-0A9B8C-Pilot.pdf\""
        );

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.starts_with(b"%PDF-"));
        assert_eq!(headers[header::CONTENT_LENGTH], bytes.len().to_string().as_str());
    }

    #[tokio::test]
    async fn test_export_pdf_respects_partner_scope() {
        let id = "0f6a7c52-2b1d-4e0a-9c55-3d2e1f0a9b8c";
        let owner = get(&format!(
            "/api/v1/proposals/{id}/export-pdf?partner_id=11111111-2222-3333-4444-555555555555"
        ))
        .await;
        assert_eq!(owner.status(), StatusCode::OK);

        let other = get(&format!(
            "/api/v1/proposals/{id}/export-pdf?partner_id=99999999-2222-3333-4444-555555555555"
        ))
        .await;
        assert_eq!(other.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_export_unknown_proposal_is_not_found() {
        let response = get("/api/v1/proposals/33333333-0000-0000-0000-000000000000/export-pdf").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_export_ungenerated_proposal_is_conflict() {
        let response = get("/api/v1/proposals/22222222-0000-0000-0000-000000000001/export-pdf").await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_render_from_body() {
        let doc = json!({
            "id": "adhoc-000042", "title": "Pilot: Phase 2", "client": "Acme",
            "createdAt": "2026-10-18", "currency": "INR",
            "content": {
                "executiveSummary": "Second phase.",
                "investment": [{"name": "Dev", "description": "", "amount": 150000}]
            }
        });
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/proposals/render")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(doc.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"Proposal-000042-Pilot__Phase_2.pdf\""
        );
    }

    #[tokio::test]
    async fn test_render_rejects_empty_summary() {
        let doc = json!({
            "id": "adhoc-1", "title": "Pilot", "client": "Acme",
            "createdAt": "2026-10-18", "currency": "USD",
            "content": {"executiveSummary": ""}
        });
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/proposals/render")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(doc.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_render_rejects_out_of_range_amounts() {
        let doc = json!({
            "id": "adhoc-2", "title": "Pilot", "client": "Acme",
            "createdAt": "2026-10-18", "currency": "USD",
            "content": {
                "executiveSummary": "Big numbers.",
                "investment": [
                    {"name": "A", "description": "", "amount": 6.0e16},
                    {"name": "B", "description": "", "amount": 6.0e16}
                ]
            }
        });
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/proposals/render")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(doc.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_render_error_hides_detail() {
        let response = AppError::Render("disk full at /tmp/x".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["error"]["message"], EXPORT_FAILED_MESSAGE);
        assert!(!body.to_string().contains("disk full"));
    }
}
