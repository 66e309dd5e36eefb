//! Permission checks for the event-management admin panel.
//!
//! [`PermissionGate`] answers "may the current user do X?" from the
//! permission list of the signed-in user, and falls back to the server's
//! `/api/permissions/check` endpoint (cached for five minutes by default)
//! for decisions the local list can't answer. The server stays the source
//! of truth; this layer only decides what the UI shows.
//!
//! ```no_run
//! use permission_gate::{GateConfig, PermissionGate, StaticToken};
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), permission_gate::GateError> {
//! let config = GateConfig::new("https://admin.example.org");
//! let gate = PermissionGate::new(&config, Arc::new(StaticToken::new("token")))?;
//! gate.reload().await?;
//!
//! if gate.has_permission("contact:read") {
//!     // render the contacts table
//! }
//! let result = gate.check_permission("notulen", "publish").await;
//! println!("allowed: {}", result.allowed);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod gate;
pub mod permission;

pub use cache::{CacheStats, PermissionCache};
pub use client::{CurrentUser, PermissionClient, RemoteDecision};
pub use config::GateConfig;
pub use credentials::{CredentialSource, StaticToken};
pub use error::{GateError, Result};
pub use gate::{CheckResult, PermissionGate};
pub use permission::{
    build_permission, parse_permission, GateDecision, PermissionSet, Requirement, SUPERUSER,
};
