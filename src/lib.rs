//! TCP reachability and latency probing.
//!
//! One [`probe()`] or [`ping()`] invocation opens sequential TCP connections
//! toward a target and reports per-attempt timings plus aggregate statistics.
//! With only an address and port the connect itself is timed (plain mode);
//! supplying a request, a matcher, a byte cap or capture switches to probe
//! mode, where the response is read back, capped and matched.
//!
//! ```no_run
//! use tcp_probe::{Matcher, ProbeOptions, probe};
//!
//! # async fn demo() -> Result<(), tcp_probe::ProbeError> {
//! let report = probe(ProbeOptions {
//!     address: "mail.example.test".into(),
//!     port: 25,
//!     matcher: Some(Matcher::regex(r"^220 ")?),
//!     exit_request: Some(b"QUIT\r\n".to_vec()),
//!     ..ProbeOptions::default()
//! })
//! .await?;
//!
//! assert_eq!(report.results.len(), 1);
//! if report.matches == Some(1) {
//!     println!("banner in {:?}", report.results[0].time);
//! }
//! # Ok(())
//! # }
//! ```

mod attempt;
mod error;
mod options;
mod probe;
mod report;

pub use error::ProbeError;
pub use options::{
    DEFAULT_MAX_RESPONSE_BYTES, DEFAULT_PING_ATTEMPTS, DEFAULT_PROBE_ATTEMPTS, DEFAULT_TIMEOUT_MS,
    Matcher, Mode, ProbeConfig, ProbeOptions,
};
pub use probe::{ping, probe};
pub use report::{AttemptResult, ProbeReport};
