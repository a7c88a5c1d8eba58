//! Metrics helpers and per-backend telemetry bookkeeping.

// std
#[cfg(feature = "prometheus")] use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
#[cfg(feature = "metrics")] use metrics::Label;
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
#[cfg(feature = "metrics")] use smallvec::SmallVec;
// self
use crate::_prelude::*;

#[cfg(feature = "metrics")]
type LabelSet = SmallVec<[Label; 2]>;

#[cfg(feature = "metrics")]
const METRIC_LOGON_TOTAL: &str = "idp_backend_logon_total";
#[cfg(feature = "metrics")]
const METRIC_RETRIES_TOTAL: &str = "idp_backend_retries_total";
#[cfg(feature = "metrics")]
const METRIC_RETRIES_EXHAUSTED_TOTAL: &str = "idp_backend_retries_exhausted_total";
#[cfg(feature = "metrics")]
const METRIC_SESSIONS_REGISTERED_TOTAL: &str = "idp_backend_sessions_registered_total";
#[cfg(feature = "metrics")]
const METRIC_SESSIONS_SWEPT_TOTAL: &str = "idp_backend_sessions_swept_total";

/// Shared Prometheus handle installed by [`install_default_exporter`].
#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Thread-safe metrics accumulator for a single identity backend.
#[derive(Debug, Default)]
pub struct BackendMetrics {
	backend: String,
	logon_successes: AtomicU64,
	logon_failures: AtomicU64,
	retries: AtomicU64,
	retries_exhausted: AtomicU64,
	sessions_registered: AtomicU64,
	sessions_swept: AtomicU64,
}
impl BackendMetrics {
	/// Create a new accumulator labelled with the backend name.
	pub fn new(backend: impl Into<String>) -> Arc<Self> {
		Arc::new(Self { backend: backend.into(), ..Default::default() })
	}

	/// Backend name used as the metric label.
	pub fn backend(&self) -> &str {
		&self.backend
	}

	/// Record a logon outcome.
	pub fn record_logon(&self, success: bool) {
		if success {
			self.logon_successes.fetch_add(1, Ordering::Relaxed);
		} else {
			self.logon_failures.fetch_add(1, Ordering::Relaxed);
		}

		#[cfg(feature = "metrics")]
		metrics::counter!(
			METRIC_LOGON_TOTAL,
			status_labels(&self.backend, if success { "success" } else { "failure" }).iter()
		)
		.increment(1);
	}

	/// Record a retried remote call.
	pub fn record_retry(&self) {
		self.retries.fetch_add(1, Ordering::Relaxed);

		#[cfg(feature = "metrics")]
		metrics::counter!(METRIC_RETRIES_TOTAL, base_labels(&self.backend).iter()).increment(1);
	}

	/// Record a remote call that ran out of retries.
	pub fn record_retries_exhausted(&self) {
		self.retries_exhausted.fetch_add(1, Ordering::Relaxed);

		#[cfg(feature = "metrics")]
		metrics::counter!(METRIC_RETRIES_EXHAUSTED_TOTAL, base_labels(&self.backend).iter())
			.increment(1);
	}

	/// Record a newly registered per-login session.
	pub fn record_session_registered(&self) {
		self.sessions_registered.fetch_add(1, Ordering::Relaxed);

		#[cfg(feature = "metrics")]
		metrics::counter!(METRIC_SESSIONS_REGISTERED_TOTAL, base_labels(&self.backend).iter())
			.increment(1);
	}

	/// Record sessions evicted by a sweep.
	pub fn record_sessions_swept(&self, count: usize) {
		self.sessions_swept.fetch_add(count as u64, Ordering::Relaxed);

		#[cfg(feature = "metrics")]
		metrics::counter!(METRIC_SESSIONS_SWEPT_TOTAL, base_labels(&self.backend).iter())
			.increment(count as u64);
	}

	/// Take a point-in-time snapshot for status reporting.
	pub fn snapshot(&self) -> BackendMetricsSnapshot {
		BackendMetricsSnapshot {
			logon_successes: self.logon_successes.load(Ordering::Relaxed),
			logon_failures: self.logon_failures.load(Ordering::Relaxed),
			retries: self.retries.load(Ordering::Relaxed),
			retries_exhausted: self.retries_exhausted.load(Ordering::Relaxed),
			sessions_registered: self.sessions_registered.load(Ordering::Relaxed),
			sessions_swept: self.sessions_swept.load(Ordering::Relaxed),
		}
	}
}

/// Read-only snapshot of per-backend counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BackendMetricsSnapshot {
	/// Successful logons.
	pub logon_successes: u64,
	/// Logons rejected by the identity source.
	pub logon_failures: u64,
	/// Remote calls attempted again after a transient failure.
	pub retries: u64,
	/// Remote calls abandoned after the retry budget ran out.
	pub retries_exhausted: u64,
	/// Per-login sessions added to the cache.
	pub sessions_registered: u64,
	/// Per-login sessions evicted by the sweep.
	pub sessions_swept: u64,
}
impl BackendMetricsSnapshot {
	/// Share of logons that succeeded.
	pub fn logon_success_rate(&self) -> f64 {
		let total = self.logon_successes + self.logon_failures;

		if total == 0 { 0.0 } else { self.logon_successes as f64 / total as f64 }
	}
}

/// Install the default Prometheus recorder backed by `metrics`.
///
/// Multiple invocations are safe; subsequent calls become no-ops once the recorder is installed.
#[cfg(feature = "prometheus")]
pub fn install_default_exporter() -> Result<()> {
	if PROMETHEUS_HANDLE.get().is_some() {
		return Ok(());
	}

	let handle = PrometheusBuilder::new().install_recorder()?;
	let _ = PROMETHEUS_HANDLE.set(handle);

	Ok(())
}

/// Access the global Prometheus exporter handle when installed.
#[cfg(feature = "prometheus")]
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
	PROMETHEUS_HANDLE.get()
}

#[cfg(feature = "metrics")]
fn base_labels(backend: &str) -> LabelSet {
	let mut labels = LabelSet::new();

	labels.push(Label::new("backend", backend.to_owned()));

	labels
}

#[cfg(feature = "metrics")]
fn status_labels(backend: &str, status: &'static str) -> LabelSet {
	let mut labels = base_labels(backend);

	labels.push(Label::new("status", status));

	labels
}
