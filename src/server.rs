//! HTTP surface: one silent-login endpoint plus a liveness probe.

// crates.io
use axum::{
	Json, Router,
	extract::State,
	http::{HeaderMap, StatusCode, header::COOKIE},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde_json::{Value, json};
use tokio::net::TcpListener;
// self
use crate::{
	_prelude::*,
	cookie::CookieIssuer,
	error::{ConfigError, TransportError},
	flows::Bridge,
};

/// Route that triggers a silent login.
pub const SILENT_LOGIN_PATH: &str = "/api/auth/oauth2/silent";
/// Liveness route.
pub const HEALTH_PATH: &str = "/healthz";

/// Builds the router served by [`serve`].
pub fn router(bridge: Bridge) -> Router {
	Router::new()
		.route(SILENT_LOGIN_PATH, post(silent_login))
		.route(HEALTH_PATH, get(health))
		.with_state(bridge)
}

/// Binds the configured listen address and serves until Ctrl-C.
pub async fn serve(bridge: Bridge) -> Result<()> {
	let addr = bridge.config.listen_addr;
	let listener = TcpListener::bind(addr).await.map_err(ConfigError::Listener)?;

	#[cfg(feature = "tracing")]
	tracing::info!(%addr, path = SILENT_LOGIN_PATH, "bridge listening");

	axum::serve(listener, router(bridge))
		.with_graceful_shutdown(shutdown_signal())
		.await
		.map_err(TransportError::Io)?;

	Ok(())
}

async fn shutdown_signal() {
	if tokio::signal::ctrl_c().await.is_err() {
		#[cfg(feature = "tracing")]
		tracing::warn!("ctrl-c handler unavailable, shutting down");
	}
}

async fn health() -> Json<Value> {
	Json(json!({ "status": "ok" }))
}

async fn silent_login(State(bridge): State<Bridge>, headers: HeaderMap) -> Response {
	let cookie_header = joined_cookie_header(&headers);
	let mut issuer = CookieIssuer::new(bridge.config.secure_cookies);
	let (status, body) = match bridge.silent_login(cookie_header.as_deref(), &mut issuer).await {
		Ok(_) => (StatusCode::OK, json!({ "success": true })),
		Err(e) => (
			StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
			error_body(&e),
		),
	};
	let mut response = (status, Json(body)).into_response();

	issuer.apply(response.headers_mut());

	response
}

// HTTP/2 clients may split cookies across several headers.
fn joined_cookie_header(headers: &HeaderMap) -> Option<String> {
	let parts = headers
		.get_all(COOKIE)
		.iter()
		.filter_map(|value| value.to_str().ok())
		.map(str::trim)
		.filter(|value| !value.is_empty())
		.collect::<Vec<_>>();

	(!parts.is_empty()).then(|| parts.join("; "))
}

/// JSON payload returned for a failed silent login.
pub fn error_body(e: &Error) -> Value {
	let details = match e {
		Error::UnexpectedAuthResponse { status, .. } => json!({ "status": status }),
		Error::ChallengeAcceptFailed { kind, status, .. } =>
			json!({ "challenge": kind.as_str(), "status": status }),
		Error::RedirectBoundExceeded { hops, last_url } =>
			json!({ "hops": hops, "last_url": last_url }),
		Error::CallbackWithoutCode { error, description } =>
			json!({ "error": error, "error_description": description }),
		Error::TokenExchangeFailed { status, .. } => json!({ "status": status }),
		_ => Value::Null,
	};

	json!({
		"success": false,
		"error": { "kind": e.kind(), "message": e.to_string(), "details": details },
	})
}

#[cfg(test)]
mod tests {
	// crates.io
	use axum::http::HeaderValue;
	// self
	use super::*;
	use crate::flows::ChallengeKind;

	#[test]
	fn cookie_headers_are_joined() {
		let mut headers = HeaderMap::new();

		headers.append(COOKIE, HeaderValue::from_static("a=1"));
		headers.append(COOKIE, HeaderValue::from_static(" b=2 "));

		assert_eq!(joined_cookie_header(&headers).as_deref(), Some("a=1; b=2"));
		assert_eq!(joined_cookie_header(&HeaderMap::new()), None);
	}

	#[test]
	fn error_bodies_carry_kind_and_details() {
		let body = error_body(&Error::ChallengeAcceptFailed {
			kind: ChallengeKind::Consent,
			status: Some(409),
			message: "conflict".into(),
		});

		assert_eq!(body["success"], false);
		assert_eq!(body["error"]["kind"], "challenge_accept_failed");
		assert_eq!(body["error"]["details"]["challenge"], "consent");
		assert_eq!(body["error"]["details"]["status"], 409);
		assert!(error_body(&Error::unauthenticated("x"))["error"]["details"].is_null());
	}
}
