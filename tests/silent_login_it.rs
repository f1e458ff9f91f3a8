// crates.io
use axum::{
	Json, Router,
	extract::State,
	http::{StatusCode, Uri, header::LOCATION},
	response::IntoResponse,
	routing::{get, post},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use httpmock::prelude::*;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tokio::net::TcpListener;
// self
use oauth2_bridge::{
	_preludet::*,
	cookie::{ACCESS_TOKEN_COOKIE, CODE_VERIFIER_COOKIE, CookieIssuer, STATE_COOKIE},
	flows::{Bridge, ChallengeKind, MAX_REDIRECT_HOPS},
	url::form_urlencoded,
};

const SESSION_COOKIE: &str = "ory_kratos_session=sess-123";

type Params = HashMap<String, String>;

/// Requests seen by [`spawn_recording_upstream`].
#[derive(Clone, Default)]
struct Seen {
	authorize: Arc<Mutex<Option<Params>>>,
	token: Arc<Mutex<Option<Params>>>,
}

fn build_bridge(server: &MockServer) -> Bridge {
	build_test_bridge(&server.base_url())
}

fn parse_params(raw: &str) -> Params {
	form_urlencoded::parse(raw.as_bytes()).into_owned().collect()
}

/// Serves whoami, authorize, and token on a loopback port, recording what the bridge sends.
async fn spawn_recording_upstream(seen: Seen) -> String {
	async fn whoami() -> Json<Value> {
		Json(json!({ "identity": { "id": "user-1" } }))
	}

	async fn authorize(State(seen): State<Seen>, uri: Uri) -> impl IntoResponse {
		let params = parse_params(uri.query().unwrap_or_default());
		let mut callback = Url::parse(TEST_REDIRECT_URI).expect("Callback URI should parse.");

		callback
			.query_pairs_mut()
			.append_pair("code", "code-1")
			.append_pair("state", params.get("state").map(String::as_str).unwrap_or_default());
		*seen.authorize.lock() = Some(params);

		(StatusCode::FOUND, [(LOCATION, callback.to_string())])
	}

	async fn token(State(seen): State<Seen>, body: String) -> Json<Value> {
		*seen.token.lock() = Some(parse_params(&body));

		Json(json!({
			"access_token": "access-1",
			"refresh_token": "refresh-1",
			"token_type": "bearer",
			"expires_in": 900
		}))
	}

	let app = Router::new()
		.route("/sessions/whoami", get(whoami))
		.route("/oauth2/auth", get(authorize))
		.route("/oauth2/token", post(token))
		.with_state(seen);
	let listener = TcpListener::bind("127.0.0.1:0").await.expect("Loopback port should bind.");
	let addr = listener.local_addr().expect("Listener should expose its address.");

	tokio::spawn(async move {
		let _ = axum::serve(listener, app).await;
	});

	format!("http://{addr}")
}

async fn mock_whoami(server: &MockServer) -> httpmock::Mock<'_> {
	server
		.mock_async(|when, then| {
			when.method(GET).path("/sessions/whoami").header("cookie", SESSION_COOKIE);
			then.status(200).json_body(json!({
				"active": true,
				"identity": {
					"id": "user-1",
					"traits": { "email": "ada@example.com" },
					"verifiable_addresses": [{ "value": "ada@example.com", "verified": true }]
				}
			}));
		})
		.await
}

async fn mock_authorize<'a>(server: &'a MockServer, location: &str) -> httpmock::Mock<'a> {
	let location = location.to_owned();

	server
		.mock_async(move |when, then| {
			when.method(GET)
				.path("/oauth2/auth")
				.query_param("response_type", "code")
				.query_param("client_id", TEST_CLIENT_ID)
				.query_param("redirect_uri", TEST_REDIRECT_URI)
				.query_param("code_challenge_method", "S256")
				.query_param_exists("code_challenge")
				.query_param_exists("state");
			then.status(302).header("location", location);
		})
		.await
}

async fn mock_token(server: &MockServer) -> httpmock::Mock<'_> {
	server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/oauth2/token")
				.form_urlencoded_tuple("grant_type", "authorization_code")
				.form_urlencoded_tuple("code", "auth-code-1");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"access-1\",\"refresh_token\":\"refresh-1\",\"token_type\":\"bearer\",\"expires_in\":900}",
			);
		})
		.await
}

#[tokio::test]
async fn full_chain_accepts_each_challenge_once_and_issues_tokens() {
	let server = MockServer::start_async().await;
	let bridge = build_bridge(&server);
	let whoami = mock_whoami(&server).await;
	let authorize = server
		.mock_async(|when, then| {
			when.method(GET).path("/oauth2/auth").query_param("response_type", "code");
			then.status(302)
				.header("location", "/login?login_challenge=lc%252F1")
				.header("set-cookie", "ory_hydra_login_csrf=csrf-1; Path=/; HttpOnly");
		})
		.await;
	let login_accept = server
		.mock_async(|when, then| {
			when.method(PUT)
				.path("/admin/oauth2/auth/requests/login/accept")
				.query_param("login_challenge", "lc/1");
			then.status(200).json_body(json!({ "redirect_to": server.url("/oauth2/auth?login_verifier=lv") }));
		})
		.await;
	let login_verifier = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/oauth2/auth")
				.query_param("login_verifier", "lv")
				.header("cookie", format!("{SESSION_COOKIE}; ory_hydra_login_csrf=csrf-1"));
			then.status(303).header("location", "/consent?consent_challenge=cc-1");
		})
		.await;
	let consent_lookup = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/admin/oauth2/auth/requests/consent")
				.query_param("consent_challenge", "cc-1");
			then.status(200).json_body(json!({
				"requested_scope": ["openid", "offline_access", "email"],
				"requested_access_token_audience": [],
				"client": { "client_id": TEST_CLIENT_ID },
				"skip": false
			}));
		})
		.await;
	let consent_accept = server
		.mock_async(|when, then| {
			when.method(PUT)
				.path("/admin/oauth2/auth/requests/consent/accept")
				.query_param("consent_challenge", "cc-1");
			then.status(200)
				.json_body(json!({ "redirect_to": server.url("/oauth2/auth?consent_verifier=cv") }));
		})
		.await;
	let consent_verifier = server
		.mock_async(|when, then| {
			when.method(GET).path("/oauth2/auth").query_param("consent_verifier", "cv");
			then.status(302).header("location", format!("{TEST_REDIRECT_URI}?code=auth-code-1&scope=openid"));
		})
		.await;
	let token = mock_token(&server).await;
	let mut cookies = CookieIssuer::new(true);
	let tokens = bridge
		.silent_login(Some(SESSION_COOKIE), &mut cookies)
		.await
		.expect("Silent login should succeed.");

	whoami.assert_async().await;
	authorize.assert_async().await;
	login_accept.assert_async().await;
	login_verifier.assert_async().await;
	consent_lookup.assert_async().await;
	consent_accept.assert_async().await;
	consent_verifier.assert_async().await;
	token.assert_async().await;

	assert_eq!(tokens.access_token.expose(), "access-1");
	assert_eq!(tokens.refresh_token.as_ref().map(|secret| secret.expose()), Some("refresh-1"));
	assert_eq!(tokens.expires_in.whole_seconds(), 900);

	let access = cookies.get(ACCESS_TOKEN_COOKIE).expect("Access token cookie should be queued.");

	assert_eq!(access.value, "access-1");
	assert!(access.http_only);
	assert!(cookies.get(CODE_VERIFIER_COOKIE).is_some_and(|cookie| cookie.is_removal()));
	assert!(cookies.get(STATE_COOKIE).is_some_and(|cookie| cookie.is_removal()));
}

#[tokio::test]
async fn missing_session_cookie_makes_no_upstream_calls() {
	let server = MockServer::start_async().await;
	let bridge = build_bridge(&server);
	let whoami = mock_whoami(&server).await;
	let authorize = mock_authorize(&server, TEST_REDIRECT_URI).await;

	for header in [None, Some("theme=dark")] {
		let mut cookies = CookieIssuer::new(true);
		let err = bridge
			.silent_login(header, &mut cookies)
			.await
			.expect_err("Requests without a session cookie should be rejected.");

		assert!(matches!(err, Error::Unauthenticated { .. }));
		assert_eq!(err.status_code(), 401);
		assert!(cookies.pending().is_empty());
	}

	assert_eq!(whoami.hits_async().await, 0);
	assert_eq!(authorize.hits_async().await, 0);
}

#[tokio::test]
async fn rejected_session_stops_before_authorization() {
	let server = MockServer::start_async().await;
	let bridge = build_bridge(&server);
	let whoami = server
		.mock_async(|when, then| {
			when.method(GET).path("/sessions/whoami");
			then.status(401).json_body(json!({ "error": { "code": 401 } }));
		})
		.await;
	let authorize = mock_authorize(&server, TEST_REDIRECT_URI).await;
	let mut cookies = CookieIssuer::new(true);
	let err = bridge
		.silent_login(Some(SESSION_COOKIE), &mut cookies)
		.await
		.expect_err("A rejected session should fail.");

	assert!(matches!(err, Error::Unauthenticated { .. }));
	assert_eq!(whoami.hits_async().await, 1);
	assert_eq!(authorize.hits_async().await, 0);
	assert!(cookies.pending().is_empty());
}

#[tokio::test]
async fn redirect_loops_are_bounded() {
	let server = MockServer::start_async().await;
	let bridge = build_bridge(&server);
	let _whoami = mock_whoami(&server).await;
	let _authorize = mock_authorize(&server, "/loop").await;
	let looping = server
		.mock_async(|when, then| {
			when.method(GET).path("/loop");
			then.status(302).header("location", "/loop");
		})
		.await;
	let token = mock_token(&server).await;
	let mut cookies = CookieIssuer::new(true);
	let err = bridge
		.silent_login(Some(SESSION_COOKIE), &mut cookies)
		.await
		.expect_err("A redirect loop should fail.");

	assert!(matches!(err, Error::RedirectBoundExceeded { hops, .. } if hops == MAX_REDIRECT_HOPS));
	assert_eq!(looping.hits_async().await, MAX_REDIRECT_HOPS);
	assert_eq!(token.hits_async().await, 0);
	assert!(cookies.get(ACCESS_TOKEN_COOKIE).is_none());
	assert!(cookies.get(CODE_VERIFIER_COOKIE).is_some_and(|cookie| cookie.is_removal()));
}

#[tokio::test]
async fn failed_login_accept_is_not_retried() {
	let server = MockServer::start_async().await;
	let bridge = build_bridge(&server);
	let _whoami = mock_whoami(&server).await;
	let _authorize = mock_authorize(&server, "/login?login_challenge=lc-1").await;
	let login_accept = server
		.mock_async(|when, then| {
			when.method(PUT).path("/admin/oauth2/auth/requests/login/accept");
			then.status(500).json_body(json!({
				"error": "server_error",
				"error_description": "database unavailable"
			}));
		})
		.await;
	let token = mock_token(&server).await;
	let mut cookies = CookieIssuer::new(true);
	let err = bridge
		.silent_login(Some(SESSION_COOKIE), &mut cookies)
		.await
		.expect_err("A failing login accept should abort the flow.");

	assert!(matches!(
		&err,
		Error::ChallengeAcceptFailed { kind: ChallengeKind::Login, status: Some(500), message }
			if message.contains("database unavailable")
	));
	assert_eq!(login_accept.hits_async().await, 1);
	assert_eq!(token.hits_async().await, 0);
}

#[tokio::test]
async fn already_handled_login_follows_redirect_to() {
	let server = MockServer::start_async().await;
	let bridge = build_bridge(&server);
	let _whoami = mock_whoami(&server).await;
	let _authorize = mock_authorize(&server, "/login?login_challenge=lc-1").await;
	let login_accept = server
		.mock_async(|when, then| {
			when.method(PUT).path("/admin/oauth2/auth/requests/login/accept");
			then.status(410).json_body(json!({
				"redirect_to": server.url("/oauth2/auth?login_verifier=lv")
			}));
		})
		.await;
	let _verifier = server
		.mock_async(|when, then| {
			when.method(GET).path("/oauth2/auth").query_param("login_verifier", "lv");
			then.status(302).header("location", format!("{TEST_REDIRECT_URI}?code=auth-code-1"));
		})
		.await;
	let token = mock_token(&server).await;
	let mut cookies = CookieIssuer::new(true);
	let tokens = bridge
		.silent_login(Some(SESSION_COOKIE), &mut cookies)
		.await
		.expect("A handled login request should continue the chain.");

	assert_eq!(tokens.access_token.expose(), "access-1");
	assert_eq!(login_accept.hits_async().await, 1);
	assert_eq!(token.hits_async().await, 1);
}

#[tokio::test]
async fn consent_for_another_client_is_refused() {
	let server = MockServer::start_async().await;
	let bridge = build_bridge(&server);
	let _whoami = mock_whoami(&server).await;
	let _authorize = mock_authorize(&server, "/consent?consent_challenge=cc-1").await;
	let _lookup = server
		.mock_async(|when, then| {
			when.method(GET).path("/admin/oauth2/auth/requests/consent");
			then.status(200).json_body(json!({
				"requested_scope": ["openid"],
				"client": { "client_id": "someone-else" }
			}));
		})
		.await;
	let accept = server
		.mock_async(|when, then| {
			when.method(PUT).path("/admin/oauth2/auth/requests/consent/accept");
			then.status(200).json_body(json!({ "redirect_to": TEST_REDIRECT_URI }));
		})
		.await;
	let mut cookies = CookieIssuer::new(true);
	let err = bridge
		.silent_login(Some(SESSION_COOKIE), &mut cookies)
		.await
		.expect_err("Consent for a foreign client should fail.");

	assert!(matches!(err, Error::ChallengeAcceptFailed { kind: ChallengeKind::Consent, .. }));
	assert_eq!(accept.hits_async().await, 0);
}

#[tokio::test]
async fn callback_errors_are_surfaced() {
	let server = MockServer::start_async().await;
	let bridge = build_bridge(&server);
	let _whoami = mock_whoami(&server).await;
	let _authorize = mock_authorize(
		&server,
		&format!("{TEST_REDIRECT_URI}?error=access_denied&error_description=The+user+denied+access"),
	)
	.await;
	let mut cookies = CookieIssuer::new(true);
	let err = bridge
		.silent_login(Some(SESSION_COOKIE), &mut cookies)
		.await
		.expect_err("A callback without code should fail.");

	match err {
		Error::CallbackWithoutCode { error, description } => {
			assert_eq!(error.as_deref(), Some("access_denied"));
			assert_eq!(description.as_deref(), Some("The user denied access"));
		},
		other => panic!("Unexpected error: {other:?}"),
	}
}

#[tokio::test]
async fn non_redirect_authorization_response_fails() {
	let server = MockServer::start_async().await;
	let bridge = build_bridge(&server);
	let _whoami = mock_whoami(&server).await;
	let _authorize = server
		.mock_async(|when, then| {
			when.method(GET).path("/oauth2/auth");
			then.status(200).body("<html>login form</html>");
		})
		.await;
	let mut cookies = CookieIssuer::new(true);
	let err = bridge
		.silent_login(Some(SESSION_COOKIE), &mut cookies)
		.await
		.expect_err("A non-redirect authorization response should fail.");

	assert!(matches!(err, Error::UnexpectedAuthResponse { status: Some(200), .. }));
}

#[tokio::test]
async fn token_response_without_access_token_fails() {
	let server = MockServer::start_async().await;
	let bridge = build_bridge(&server);
	let _whoami = mock_whoami(&server).await;
	let _authorize = mock_authorize(&server, &format!("{TEST_REDIRECT_URI}?code=auth-code-1")).await;
	let token = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth2/token");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"token_type\":\"bearer\",\"expires_in\":3600}");
		})
		.await;
	let mut cookies = CookieIssuer::new(true);
	let err = bridge
		.silent_login(Some(SESSION_COOKIE), &mut cookies)
		.await
		.expect_err("A token response without access_token should fail.");

	assert!(matches!(err, Error::TokenExchangeFailed { .. }));
	assert_eq!(token.hits_async().await, 1);
	assert!(cookies.get(ACCESS_TOKEN_COOKIE).is_none());
	assert!(cookies.get(STATE_COOKIE).is_some_and(|cookie| cookie.is_removal()));
}

#[tokio::test]
async fn token_request_proves_the_challenged_verifier() {
	let seen = Seen::default();
	let base = spawn_recording_upstream(seen.clone()).await;
	let bridge = build_test_bridge(&base);
	let mut cookies = CookieIssuer::new(false);
	let tokens = bridge
		.silent_login(Some(SESSION_COOKIE), &mut cookies)
		.await
		.expect("Silent login should succeed.");

	assert_eq!(tokens.access_token.expose(), "access-1");

	let authorize = seen.authorize.lock().take().expect("Authorization request should be seen.");
	let token = seen.token.lock().take().expect("Token request should be seen.");
	let verifier = &token["code_verifier"];

	assert!((43..=128).contains(&verifier.len()));
	assert!(verifier.chars().all(|c| c.is_ascii_alphanumeric() || "-._~".contains(c)));
	assert_eq!(authorize["code_challenge_method"], "S256");
	assert_eq!(authorize["code_challenge"], URL_SAFE_NO_PAD.encode(Sha256::digest(verifier)));
	assert_eq!(token["grant_type"], "authorization_code");
	assert_eq!(token["code"], "code-1");
	assert_eq!(token["redirect_uri"], TEST_REDIRECT_URI);
	assert_eq!(token["client_id"], TEST_CLIENT_ID);
	assert_eq!(authorize["redirect_uri"], TEST_REDIRECT_URI);
	assert_eq!(authorize["client_id"], TEST_CLIENT_ID);
}

#[tokio::test]
async fn captured_cookies_are_not_replayed_to_other_hosts() {
	let server = MockServer::start_async().await;
	let partner = MockServer::start_async().await;
	let bridge = build_bridge(&server);
	let partner_hop = format!("{}/hop", partner.base_url().replace("127.0.0.1", "localhost"));
	let _whoami = mock_whoami(&server).await;
	let _authorize = server
		.mock_async(|when, then| {
			when.method(GET).path("/oauth2/auth");
			then.status(302)
				.header("location", partner_hop.as_str())
				.header("set-cookie", "ory_hydra_login_csrf=hydra-only; Path=/; HttpOnly");
		})
		.await;
	let hop = partner
		.mock_async(|when, then| {
			when.method(GET).path("/hop").header("cookie", SESSION_COOKIE);
			then.status(302)
				.header("location", format!("{TEST_REDIRECT_URI}?code=auth-code-1"));
		})
		.await;
	let token = mock_token(&server).await;
	let mut cookies = CookieIssuer::new(true);

	bridge
		.silent_login(Some(SESSION_COOKIE), &mut cookies)
		.await
		.expect("Silent login through a partner hop should succeed.");

	hop.assert_async().await;
	token.assert_async().await;
}
