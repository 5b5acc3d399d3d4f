use std::time::Duration;

use serde::Serialize;

use crate::error::ProbeError;
use crate::options::{Mode, ProbeConfig};

/// Outcome of one connect-to-finalize cycle.
///
/// Fields are optional when the attempt never produced them: an attempt that
/// never connected has no timings, no match verdict and no received bytes.
/// Serialized timings are fractional milliseconds; absent fields are omitted.
#[derive(Debug, Serialize)]
pub struct AttemptResult {
    /// 0-based position within the invocation.
    pub seq: u32,
    /// Attempt start to established connection.
    #[serde(serialize_with = "ser_ms", skip_serializing_if = "Option::is_none")]
    pub connect_time: Option<Duration>,
    /// Attempt start to finalization. Equals `connect_time` in plain mode.
    #[serde(serialize_with = "ser_ms", skip_serializing_if = "Option::is_none")]
    pub time: Option<Duration>,
    /// Last match verdict. Present only when a matcher was configured and
    /// the attempt got far enough to own a response buffer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<bool>,
    /// Terminal fault, if the attempt ended in one.
    #[serde(serialize_with = "ser_error", skip_serializing_if = "Option::is_none")]
    pub error: Option<ProbeError>,
    /// Response bytes considered, bounded by the configured cap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_received: Option<usize>,
    /// Captured response, when capture was requested and data arrived.
    #[serde(serialize_with = "ser_data", skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
}

/// Aggregated outcome of one [`probe()`](crate::probe())/
/// [`ping()`](crate::ping()) invocation. Holds every attempt in order plus
/// summary statistics over the attempts that produced timings.
#[derive(Debug, Serialize)]
pub struct ProbeReport {
    pub address: String,
    pub port: u16,
    /// Attempts that ran. Always equals `results.len()`.
    pub attempts: u32,
    /// Attempts whose connection was never established.
    pub dropped: u32,
    /// Attempts whose final match verdict was positive. Probe mode only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matches: Option<u32>,
    /// Attempts that finalized with an error. Probe mode only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<u32>,
    /// Mean total time over attempts that have one.
    #[serde(serialize_with = "ser_ms", skip_serializing_if = "Option::is_none")]
    pub avg: Option<Duration>,
    #[serde(serialize_with = "ser_ms", skip_serializing_if = "Option::is_none")]
    pub min: Option<Duration>,
    #[serde(serialize_with = "ser_ms", skip_serializing_if = "Option::is_none")]
    pub max: Option<Duration>,
    /// Mean connect time over attempts that connected. Probe mode only; in
    /// plain mode connect time and total time coincide.
    #[serde(serialize_with = "ser_ms", skip_serializing_if = "Option::is_none")]
    pub con_avg: Option<Duration>,
    #[serde(serialize_with = "ser_ms", skip_serializing_if = "Option::is_none")]
    pub con_min: Option<Duration>,
    #[serde(serialize_with = "ser_ms", skip_serializing_if = "Option::is_none")]
    pub con_max: Option<Duration>,
    /// Per-attempt results in run order.
    pub results: Vec<AttemptResult>,
}

/// Fold per-attempt results into the invocation report.
///
/// Statistics are computed only over attempts that carry the corresponding
/// value. An invocation where nothing connected reports `None` for every
/// aggregate rather than a misleading zero.
pub(crate) fn aggregate(config: &ProbeConfig, results: Vec<AttemptResult>) -> ProbeReport {
    let dropped = results.iter().filter(|r| r.connect_time.is_none()).count() as u32;

    let times: Vec<Duration> = results.iter().filter_map(|r| r.time).collect();
    let (avg, min, max) = summarize(&times);

    let (matches, errors, con_avg, con_min, con_max) = match config.mode {
        Mode::Probe => {
            let connects: Vec<Duration> = results.iter().filter_map(|r| r.connect_time).collect();
            let (con_avg, con_min, con_max) = summarize(&connects);
            let matches = results.iter().filter(|r| r.matched == Some(true)).count() as u32;
            let errors = results.iter().filter(|r| r.error.is_some()).count() as u32;
            (Some(matches), Some(errors), con_avg, con_min, con_max)
        }
        Mode::Plain => (None, None, None, None, None),
    };

    ProbeReport {
        address: config.address.clone(),
        port: config.port,
        attempts: config.attempts,
        dropped,
        matches,
        errors,
        avg,
        min,
        max,
        con_avg,
        con_min,
        con_max,
        results,
    }
}

fn summarize(samples: &[Duration]) -> (Option<Duration>, Option<Duration>, Option<Duration>) {
    if samples.is_empty() {
        return (None, None, None);
    }
    let total: Duration = samples.iter().sum();
    let avg = total / samples.len() as u32;
    let min = samples.iter().min().copied();
    let max = samples.iter().max().copied();
    (Some(avg), min, max)
}

fn ser_ms<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match value {
        Some(d) => serializer.serialize_f64(d.as_secs_f64() * 1_000.0),
        None => serializer.serialize_none(),
    }
}

fn ser_error<S>(value: &Option<ProbeError>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match value {
        Some(e) => serializer.serialize_str(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

fn ser_data<S>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match value {
        Some(bytes) => serializer.serialize_str(&String::from_utf8_lossy(bytes)),
        None => serializer.serialize_none(),
    }
}
