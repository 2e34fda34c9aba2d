//! Inquiries and adoption applications

use reqwest::Method;
use serde_json::json;

use crate::client::{cache_scope, segment, AdoptionClient, APPLICATIONS_TTL, INQUIRIES_TTL};
use crate::error::Result;
use crate::types::{Application, ApplicationStatus, Inquiry, NewApplication, NewInquiry};

impl AdoptionClient {
    /// Inquiries the user has sent
    pub async fn inquiries(&self, token: &str) -> Result<Vec<Inquiry>> {
        let scope = cache_scope(token);
        self.cached_get("inquiries", &[], Some(token), Some(&scope), INQUIRIES_TTL)
            .await
    }

    /// Inquiries about the user's own listings
    pub async fn received_inquiries(&self, token: &str) -> Result<Vec<Inquiry>> {
        let scope = cache_scope(token);
        self.cached_get(
            "inquiries/received",
            &[],
            Some(token),
            Some(&scope),
            INQUIRIES_TTL,
        )
        .await
    }

    pub async fn send_inquiry(&self, token: &str, inquiry: &NewInquiry) -> Result<Inquiry> {
        let created = self
            .send_json(Method::POST, "inquiries", Some(inquiry), Some(token))
            .await?;
        self.invalidate_scoped(&cache_scope(token), "inquiries");
        Ok(created)
    }

    /// Listing owner answers an inquiry
    pub async fn respond_to_inquiry(
        &self,
        token: &str,
        inquiry_id: &str,
        response: &str,
    ) -> Result<Inquiry> {
        let path = format!("inquiries/{}/respond", segment(inquiry_id));
        let body = json!({ "response": response });
        let updated = self
            .send_json(Method::PUT, &path, Some(&body), Some(token))
            .await?;
        self.invalidate_scoped(&cache_scope(token), "inquiries");
        Ok(updated)
    }

    /// Applications the user has submitted
    pub async fn applications(&self, token: &str) -> Result<Vec<Application>> {
        let scope = cache_scope(token);
        self.cached_get(
            "applications",
            &[],
            Some(token),
            Some(&scope),
            APPLICATIONS_TTL,
        )
        .await
    }

    /// Applications for the user's own listings
    pub async fn received_applications(&self, token: &str) -> Result<Vec<Application>> {
        let scope = cache_scope(token);
        self.cached_get(
            "applications/received",
            &[],
            Some(token),
            Some(&scope),
            APPLICATIONS_TTL,
        )
        .await
    }

    pub async fn submit_application(
        &self,
        token: &str,
        application: &NewApplication,
    ) -> Result<Application> {
        let created = self
            .send_json(Method::POST, "applications", Some(application), Some(token))
            .await?;
        self.invalidate_scoped(&cache_scope(token), "applications");
        Ok(created)
    }

    /// Listing owner moves an application along (approve, reject, ...)
    pub async fn update_application_status(
        &self,
        token: &str,
        application_id: &str,
        status: ApplicationStatus,
    ) -> Result<Application> {
        let path = format!("applications/{}/status", segment(application_id));
        let body = json!({ "status": status });
        let updated = self
            .send_json(Method::PUT, &path, Some(&body), Some(token))
            .await?;
        self.invalidate_scoped(&cache_scope(token), "applications");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::client_for;
    use crate::error::ApiError;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_send_inquiry_invalidates_sent_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/inquiries"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/inquiries"))
            .and(body_json(json!({ "petId": "4", "message": "Is she litter trained?" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": 10, "petId": 4, "message": "Is she litter trained?", "status": "open"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        assert!(client.inquiries("tok").await.unwrap().is_empty());

        let created = client
            .send_inquiry(
                "tok",
                &NewInquiry {
                    pet_id: "4".into(),
                    message: "Is she litter trained?".into(),
                    contact_phone: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(created.id, "10");

        client.inquiries("tok").await.unwrap();
    }

    #[tokio::test]
    async fn test_update_application_status_body() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/applications/8/status"))
            .and(body_json(json!({ "status": "under_review" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 8, "petId": 4, "status": "under_review"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let app = client
            .update_application_status("tok", "8", ApplicationStatus::UnderReview)
            .await
            .unwrap();
        assert_eq!(app.status, ApplicationStatus::UnderReview);
    }

    #[tokio::test]
    async fn test_duplicate_application_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/applications"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "error": "You have already applied for this pet"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client
            .submit_application(
                "tok",
                &NewApplication {
                    pet_id: "4".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(409));
        assert_eq!(err.user_message(), "You have already applied for this pet");
        assert!(!matches!(err, ApiError::Validation { .. }));
    }
}
