//! Authentication endpoints

use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;

use crate::client::AdoptionClient;
use crate::error::{ApiError, Result};
use crate::types::{
    AuthResponse, Credentials, HealthStatus, Registration, TokenRefresh, User, UserEnvelope,
    VerifyResponse,
};

/// Remote authentication operations the session layer depends on.
///
/// Implemented by [`AdoptionClient`]; tests substitute their own.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn register(&self, data: &Registration) -> Result<AuthResponse>;

    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse>;

    /// Invalidate the token pair server-side
    async fn logout(&self, access_token: &str, refresh_token: &str) -> Result<()>;

    /// Exchange a refresh token for a new access token
    async fn refresh(&self, refresh_token: &str) -> Result<TokenRefresh>;

    /// Ask the server whether an access token is still accepted
    async fn verify(&self, access_token: &str) -> Result<bool>;

    async fn current_user(&self, access_token: &str) -> Result<User>;

    async fn health(&self) -> Result<HealthStatus>;
}

#[async_trait]
impl AuthApi for AdoptionClient {
    async fn register(&self, data: &Registration) -> Result<AuthResponse> {
        self.send_json(Method::POST, "auth/register", Some(data), None)
            .await
    }

    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse> {
        self.send_json(Method::POST, "auth/login", Some(credentials), None)
            .await
    }

    async fn logout(&self, access_token: &str, refresh_token: &str) -> Result<()> {
        let body = json!({ "refreshToken": refresh_token });
        self.send_unit(Method::POST, "auth/logout", Some(&body), Some(access_token))
            .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenRefresh> {
        let body = json!({ "refreshToken": refresh_token });
        self.send_json(Method::POST, "auth/refresh", Some(&body), None)
            .await
    }

    async fn verify(&self, access_token: &str) -> Result<bool> {
        match self
            .get_json::<VerifyResponse>("auth/verify", &[], Some(access_token))
            .await
        {
            Ok(resp) => Ok(resp.valid),
            Err(ApiError::Authentication(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn current_user(&self, access_token: &str) -> Result<User> {
        let envelope: UserEnvelope = self.get_json("auth/me", &[], Some(access_token)).await?;
        Ok(envelope.into_user())
    }

    async fn health(&self) -> Result<HealthStatus> {
        self.get_json("health", &[], None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::client_for;
    use crate::types::UserRole;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn auth_body() -> serde_json::Value {
        json!({
            "user": { "id": 1, "email": "ada@example.com", "name": "Ada", "role": "adopter" },
            "accessToken": "access-1",
            "refreshToken": "refresh-1",
            "expiresIn": 900
        })
    }

    #[tokio::test]
    async fn test_login_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .and(body_json(json!({ "email": "ada@example.com", "password": "whiskers" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(auth_body()))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let resp = client
            .login(&Credentials {
                email: "ada@example.com".into(),
                password: "whiskers".into(),
            })
            .await
            .unwrap();

        assert_eq!(resp.user.id, "1");
        assert_eq!(resp.user.role, UserRole::Adopter);
        assert_eq!(resp.access_token, "access-1");
        assert_eq!(resp.refresh_token, "refresh-1");
        assert_eq!(resp.expires_in, Some(900));
    }

    #[tokio::test]
    async fn test_login_invalid_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({ "error": "Invalid credentials" })),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client
            .login(&Credentials {
                email: "ada@example.com".into(),
                password: "wrong".into(),
            })
            .await
            .unwrap_err();

        assert_eq!(err, ApiError::Authentication("Invalid credentials".into()));
    }

    #[tokio::test]
    async fn test_register_validation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/register"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "message": "Validation failed",
                "details": { "password": ["must be at least 8 characters"] }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client
            .register(&Registration {
                email: "ada@example.com".into(),
                password: "short".into(),
                name: "Ada".into(),
                phone: None,
                role: None,
            })
            .await
            .unwrap_err();

        let ApiError::Validation { details, .. } = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert_eq!(details["password"], vec!["must be at least 8 characters"]);
    }

    #[tokio::test]
    async fn test_refresh_without_rotation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .and(body_json(json!({ "refreshToken": "refresh-1" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "accessToken": "access-2" })),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let refreshed = client.refresh("refresh-1").await.unwrap();
        assert_eq!(refreshed.access_token, "access-2");
        assert!(refreshed.refresh_token.is_none());
    }

    #[tokio::test]
    async fn test_logout_ignores_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/logout"))
            .and(header("authorization", "Bearer access-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "message": "Logged out" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        client.logout("access-1", "refresh-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_verify_maps_401_to_false() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/verify"))
            .and(header("authorization", "Bearer good"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "valid": true })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/auth/verify"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        assert!(client.verify("good").await.unwrap());
        assert!(!client.verify("stale").await.unwrap());
    }

    #[tokio::test]
    async fn test_current_user_wrapped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "user": { "id": "u1", "email": "ada@example.com", "role": "owner" }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let user = client.current_user("access-1").await.unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(user.role, UserRole::Owner);
    }

    #[tokio::test]
    async fn test_health() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "status": "ok", "timestamp": "2026-01-01T00:00:00Z" })),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        assert!(client.health().await.unwrap().is_ok());
    }
}
