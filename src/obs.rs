//! Optional observability helpers for the silent-login flow.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `oauth2_bridge.flow` with the `stage` and
//!   `op` fields, and to install the process-wide subscriber via [`init_tracing`].
//! - Enable `metrics` to increment the `oauth2_bridge_flow_total` counter for every
//!   attempt/success/failure, labeled by `stage` + `outcome` (+ `error` on failures), and to
//!   record the `oauth2_bridge_redirect_hops` histogram.
//!
//! Nothing here logs tokens, verifiers, or cookie values; redirect hops are reported by origin
//! and path only.

mod counter;
mod span;
mod subscriber;

pub use counter::*;
pub use span::*;
pub use subscriber::*;

// self
use crate::{_prelude::*, flows::ChallengeKind};

/// Flow stages observed by the bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowStage {
	/// Whole silent-login invocation.
	SilentLogin,
	/// First-party session verification.
	Session,
	/// Initial authorization request.
	Authorize,
	/// Login challenge acceptance.
	LoginAccept,
	/// Consent challenge acceptance.
	ConsentAccept,
	/// Opaque redirect hop inside the chain.
	RedirectHop,
	/// Authorization code exchange.
	TokenExchange,
}
impl FlowStage {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowStage::SilentLogin => "silent_login",
			FlowStage::Session => "session",
			FlowStage::Authorize => "authorize",
			FlowStage::LoginAccept => "login_accept",
			FlowStage::ConsentAccept => "consent_accept",
			FlowStage::RedirectHop => "redirect_hop",
			FlowStage::TokenExchange => "token_exchange",
		}
	}
}
impl Display for FlowStage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a bridge stage.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Records the terminal outcome of `result` for `stage`, logging the error kind on failure.
pub fn record_result<T>(stage: FlowStage, result: &Result<T>) {
	match result {
		Ok(_) => record_flow_outcome(stage, FlowOutcome::Success),
		Err(e) => {
			record_flow_failure(stage, e.kind());

			#[cfg(feature = "tracing")]
			tracing::warn!(stage = stage.as_str(), error.kind = e.kind(), error = %e, "flow stage failed");
		},
	}
}

/// Logs one inspected redirect hop without its query string.
pub fn redirect_hop(index: usize, url: &Url) {
	#[cfg(feature = "tracing")]
	tracing::debug!(hop = index, target = %redacted_target(url), "following redirect");

	#[cfg(not(feature = "tracing"))]
	let _ = (index, url);
}

/// Logs an admin reply that reported the challenge as already handled.
pub fn handled_challenge(kind: ChallengeKind, status: u16) {
	#[cfg(feature = "tracing")]
	tracing::info!(challenge = kind.as_str(), status, "challenge already handled, following redirect_to");

	#[cfg(not(feature = "tracing"))]
	let _ = (kind, status);
}

/// Origin plus path of `url`; query and fragment carry challenges and codes.
pub fn redacted_target(url: &Url) -> String {
	format!("{}{}", url.origin().ascii_serialization(), url.path())
}
