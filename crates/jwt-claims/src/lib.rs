//! Unverified JWT claims
//!
//! Decodes the payload segment of a JSON Web Token without checking its
//! signature. The result is a read model for quick client-side decisions
//! (token expiry, showing an admin menu). It must never gate an action the
//! server has not authorized itself.

mod claims;
mod error;

pub use claims::{decode, Claims};
pub use error::{ClaimsError, Result};
