//! Silent OAuth 2.0 bridge: turn an existing identity-provider session into authorization-server
//! tokens by driving the Authorization Code + PKCE redirect chain server-side.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod cookie;
pub mod error;
pub mod flows;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod server;
pub mod session;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::ScopeSet,
		config::{BridgeConfig, ClientAuthMethod},
		flows::Bridge,
		http::ReqwestHttpClient,
	};

	/// Client identifier used by test configurations.
	pub const TEST_CLIENT_ID: &str = "bridge-client";
	/// Callback URI registered for the test client.
	pub const TEST_REDIRECT_URI: &str = "https://app.example.com/api/auth/callback";

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests while keeping redirect following disabled.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.redirect(reqwest::redirect::Policy::none())
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Builds a configuration whose IdP, public, and admin endpoints all live on `base`.
	pub fn test_config(base: &str) -> BridgeConfig {
		let base = Url::parse(base).expect("Mock server base URL should parse.");

		BridgeConfig::builder()
			.identity_provider(base.clone())
			.authorization_server(base.clone())
			.authorization_admin(base)
			.client_id(TEST_CLIENT_ID)
			.client_auth_method(ClientAuthMethod::NoneWithPkce)
			.redirect_uri(
				Url::parse(TEST_REDIRECT_URI).expect("Test redirect URI should parse."),
			)
			.scope(
				ScopeSet::new(["openid", "offline_access", "email"])
					.expect("Test scope set should be valid."),
			)
			.build()
			.expect("Test configuration should build.")
	}

	/// Constructs a [`Bridge`] against `base` using the insecure test transport.
	pub fn build_test_bridge(base: &str) -> Bridge {
		Bridge::with_http_client(test_config(base), test_reqwest_http_client())
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::Mutex;
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use error::{Error, Result};
pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _, tower as _};
