//! Rust client for the cat adoption marketplace REST API
//!
//! Typed bindings for the marketplace endpoints, with a shared TTL response
//! cache in front of read requests. The client is stateless with respect to
//! authentication: protected calls take the caller's access token, and token
//! storage and refresh are handled by the session layer.
//!
//! # Example
//!
//! ```no_run
//! use adoption_api::{AdoptionClient, PetFilters};
//!
//! # async fn example() -> Result<(), adoption_api::ApiError> {
//! let client = AdoptionClient::new("http://localhost:3000/api")?;
//!
//! let filters = PetFilters {
//!     species: Some("cat".into()),
//!     good_with_kids: Some(true),
//!     ..Default::default()
//! };
//! let page = client.list_pets(&filters).await?;
//! for pet in page.items {
//!     println!("{} ({})", pet.name, pet.status.as_str());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # API Coverage
//!
//! ## Auth
//! - `POST /auth/register`, `POST /auth/login`, `POST /auth/logout`
//! - `POST /auth/refresh`, `GET /auth/verify`, `GET /auth/me`
//! - `GET /health`
//!
//! ## Pets
//! - `GET /pets`, `GET /pets/{id}`, `GET /pets/mine`
//! - `POST /pets`, `PUT /pets/{id}`, `DELETE /pets/{id}`
//!
//! ## Favorites
//! - `GET /favorites`, `POST /favorites/{petId}`, `DELETE /favorites/{petId}`
//!
//! ## Inquiries and applications
//! - `GET /inquiries`, `GET /inquiries/received`, `POST /inquiries`,
//!   `PUT /inquiries/{id}/respond`
//! - `GET /applications`, `GET /applications/received`, `POST /applications`,
//!   `PUT /applications/{id}/status`
//!
//! ## Messages and notifications
//! - `GET /messages/conversations`, `GET /messages/conversations/{id}`,
//!   `POST /messages`
//! - `GET /notifications`, `GET /notifications/unread-count`,
//!   `PUT /notifications/{id}/read`, `PUT /notifications/read-all`

mod auth;
mod client;
mod error;
mod favorites;
mod inquiries;
mod messages;
mod pets;
mod types;

pub use auth::AuthApi;
pub use client::{cache_scope, AdoptionClient, ResponseCache};
pub use error::{ApiError, Result};
pub use types::*;
