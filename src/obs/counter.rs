// self
use crate::obs::{FlowOutcome, FlowStage};

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(stage: FlowStage, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"oauth2_bridge_flow_total",
			"stage" => stage.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (stage, outcome);
	}
}

/// Records a failure labeled with the error kind.
pub fn record_flow_failure(stage: FlowStage, error_kind: &'static str) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"oauth2_bridge_flow_total",
			"stage" => stage.as_str(),
			"outcome" => FlowOutcome::Failure.as_str(),
			"error" => error_kind
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (stage, error_kind);
	}
}

/// Records how many hops a finished redirect chain took.
pub fn record_redirect_hops(hops: usize) {
	#[cfg(feature = "metrics")]
	{
		metrics::histogram!("oauth2_bridge_redirect_hops").record(hops as f64);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = hops;
	}
}
