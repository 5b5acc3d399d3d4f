use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use regex::bytes::Regex;

use crate::error::ProbeError;

/// Connect/idle ceiling applied when none is configured, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
/// Cap on accumulated response bytes applied when none is configured.
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 50_000;
/// Attempts run by [`probe()`](crate::probe()) when none are configured.
pub const DEFAULT_PROBE_ATTEMPTS: u32 = 1;
/// Attempts run by [`ping()`](crate::ping()) when none are configured.
pub const DEFAULT_PING_ATTEMPTS: u32 = 10;

/// How the accumulated response buffer is tested for a match.
///
/// The test runs against the raw bytes every time new data is appended, so a
/// pattern split across TCP segments still matches once the fragments have
/// coalesced.
#[derive(Clone)]
pub enum Matcher {
    /// Substring containment over the buffer.
    Bytes(Vec<u8>),
    /// Regular expression evaluated over the buffer.
    Regex(Regex),
    /// Arbitrary predicate over the buffer and the resolved config.
    Predicate(Arc<dyn Fn(&[u8], &ProbeConfig) -> bool + Send + Sync>),
}

impl Matcher {
    /// Substring matcher. An empty pattern matches any buffer.
    pub fn bytes(pattern: impl Into<Vec<u8>>) -> Self {
        Matcher::Bytes(pattern.into())
    }

    /// Regular-expression matcher over raw bytes.
    pub fn regex(pattern: &str) -> Result<Self, ProbeError> {
        Regex::new(pattern)
            .map(Matcher::Regex)
            .map_err(|e| ProbeError::InvalidOptions(format!("bad match pattern: {e}")))
    }

    /// Predicate matcher.
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&[u8], &ProbeConfig) -> bool + Send + Sync + 'static,
    {
        Matcher::Predicate(Arc::new(f))
    }

    pub(crate) fn is_match(&self, buf: &[u8], config: &ProbeConfig) -> bool {
        match self {
            Matcher::Bytes(needle) => contains(buf, needle),
            Matcher::Regex(re) => re.is_match(buf),
            Matcher::Predicate(f) => f(buf, config),
        }
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Bytes(needle) => f.debug_tuple("Bytes").field(needle).finish(),
            Matcher::Regex(re) => f.debug_tuple("Regex").field(&re.as_str()).finish(),
            Matcher::Predicate(_) => f.write_str("Predicate"),
        }
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Caller-facing probe options.
///
/// Every field has a usable default, so `ProbeOptions::default()` alone
/// describes a single plain connect to `localhost:80`. Supplying any of
/// `request`, `exit_request`, `matcher`, `capture` or `max_response_bytes`
/// switches the invocation into probe mode, where the target's response is
/// read, capped and matched; otherwise only the bare connect is timed.
#[derive(Debug, Clone)]
pub struct ProbeOptions {
    /// Target host name or IP literal. Default `"localhost"`.
    pub address: String,
    /// Target TCP port. Default `80`; `0` is rejected.
    pub port: u16,
    /// Sequential attempts to run. Unset means 1 for
    /// [`probe()`](crate::probe()) and 10 for [`ping()`](crate::ping()).
    pub attempts: Option<u32>,
    /// Connect ceiling and per-read idle ceiling, in milliseconds.
    /// Default `5000`.
    pub timeout_ms: u64,
    /// Ceiling on the whole wait for a matching or complete response,
    /// counted from attempt start. Falls back to `timeout_ms` when unset.
    pub response_timeout_ms: Option<u64>,
    /// Payload written right after the connection is established.
    pub request: Option<Vec<u8>>,
    /// Payload sent best-effort immediately before the socket closes.
    pub exit_request: Option<Vec<u8>>,
    /// Match test applied to the accumulated response.
    pub matcher: Option<Matcher>,
    /// Keep the accumulated response bytes in the attempt result.
    pub capture: bool,
    /// Cap on accumulated response bytes. Default `50_000`; `0` is rejected.
    pub max_response_bytes: Option<usize>,
    /// TCP_NODELAY on the probe socket. Default `true`.
    pub no_delay: bool,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        ProbeOptions {
            address: "localhost".to_string(),
            port: 80,
            attempts: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            response_timeout_ms: None,
            request: None,
            exit_request: None,
            matcher: None,
            capture: false,
            max_response_bytes: None,
            no_delay: true,
        }
    }
}

impl ProbeOptions {
    /// Options for `address:port` with everything else at its default.
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        ProbeOptions {
            address: address.into(),
            port,
            ..ProbeOptions::default()
        }
    }

    /// Validate and freeze the options into the per-invocation config.
    pub(crate) fn resolve(self, default_attempts: u32) -> Result<ProbeConfig, ProbeError> {
        if self.port == 0 {
            return Err(ProbeError::InvalidOptions(
                "port must be in 1..=65535".to_string(),
            ));
        }
        let attempts = self.attempts.unwrap_or(default_attempts);
        if attempts == 0 {
            return Err(ProbeError::InvalidOptions(
                "attempts must be positive".to_string(),
            ));
        }
        if self.max_response_bytes == Some(0) {
            return Err(ProbeError::InvalidOptions(
                "max_response_bytes must be positive".to_string(),
            ));
        }

        let mode = if self.request.is_some()
            || self.exit_request.is_some()
            || self.matcher.is_some()
            || self.capture
            || self.max_response_bytes.is_some()
        {
            Mode::Probe
        } else {
            Mode::Plain
        };

        Ok(ProbeConfig {
            address: self.address,
            port: self.port,
            attempts,
            timeout: Duration::from_millis(self.timeout_ms),
            response_timeout: Duration::from_millis(
                self.response_timeout_ms.unwrap_or(self.timeout_ms),
            ),
            request: self.request.unwrap_or_default(),
            exit_request: self.exit_request,
            matcher: self.matcher,
            capture: self.capture,
            max_response_bytes: self.max_response_bytes.unwrap_or(DEFAULT_MAX_RESPONSE_BYTES),
            no_delay: self.no_delay,
            mode,
        })
    }
}

/// Operating mode derived from the options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Time the bare connect, then close.
    Plain,
    /// Write the request, then read, cap and match the response.
    Probe,
}

/// Immutable per-invocation configuration, resolved from [`ProbeOptions`].
/// All attempts of one invocation share it.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub address: String,
    pub port: u16,
    pub attempts: u32,
    pub timeout: Duration,
    pub response_timeout: Duration,
    pub request: Vec<u8>,
    pub exit_request: Option<Vec<u8>>,
    pub matcher: Option<Matcher>,
    pub capture: bool,
    pub max_response_bytes: usize,
    pub no_delay: bool,
    pub mode: Mode,
}
