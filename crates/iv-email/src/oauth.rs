// SPDX-License-Identifier: MIT OR Apache-2.0
//! OAuth token refresh for monitors configured with `auth_kind = "oauth"`.
//!
//! The check engine has no opinion about which provider a monitor
//! authenticates against; it only needs a bearer token before handing
//! credentials to [`iv_mailbox::connect`]. Implementors own the
//! provider-specific refresh flow (Google, Microsoft, ...); the engine just
//! needs something behind this trait at call time.

use async_trait::async_trait;
use iv_error::IvResult;

/// A refreshed OAuth access token.
#[derive(Debug, Clone)]
pub struct RefreshedToken {
    /// Bearer token to present as the IMAP password via XOAUTH2.
    pub access_token: String,
    /// Seconds until the token expires, if the provider reported one.
    pub expires_in_secs: Option<u64>,
}

/// Exchanges a stored (decrypted) refresh token for a fresh access token.
#[async_trait]
pub trait OAuthRefresher: Send + Sync {
    /// Refresh `refresh_token`, returning a new bearer token.
    async fn refresh(&self, refresh_token: &str) -> IvResult<RefreshedToken>;
}
