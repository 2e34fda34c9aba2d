//! Session management for the adoption marketplace client
//!
//! Keeps the signed-in user's token pair in durable storage, attaches the
//! access token to API calls, and replaces it when the server rejects it or
//! when it is about to expire.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use adoption_api::{AdoptionClient, Credentials};
//! use adoption_session::{FileTokenStorage, SessionConfig, SessionManager};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = AdoptionClient::new("http://localhost:3000/api")?;
//! let storage = Arc::new(FileTokenStorage::new("tokens.json"));
//! let session = SessionManager::with_cache(
//!     Arc::new(client.clone()),
//!     storage,
//!     SessionConfig::default(),
//!     client.cache().clone(),
//! );
//!
//! session.init().await;
//! session
//!     .login(&Credentials {
//!         email: "ada@example.com".into(),
//!         password: "whiskers".into(),
//!     })
//!     .await?;
//!
//! let favorites = session
//!     .authorized(|token| {
//!         let client = client.clone();
//!         async move { client.favorites(&token).await }
//!     })
//!     .await?;
//! println!("{} favorites", favorites.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Refresh
//!
//! A request rejected with 401 is retried once after a token refresh.
//! Refreshes are single-flight: concurrent rejections wait for one network
//! refresh and reuse its token. A background task also refreshes tokens that
//! are close to expiry. A refresh the server rejects ends the session;
//! network failures leave it in place.

mod config;
mod error;
mod manager;
mod storage;
mod tasks;
mod tokens;

pub use config::{
    SessionConfig, DEFAULT_POLL_INTERVAL, DEFAULT_REFRESH_CHECK_INTERVAL,
    DEFAULT_REFRESH_THRESHOLD,
};
pub use error::{Result, SessionError, StorageError};
pub use manager::{AuthState, SessionManager};
pub use storage::{FileTokenStorage, MemoryTokenStorage, TokenStorage};
pub use tokens::{
    clear_tokens, has_valid_tokens, load_tokens, save_tokens, StoredTokens, TokenPair,
    ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, TOKEN_EXPIRY_KEY,
};
