use tracing::debug;

use crate::attempt;
use crate::error::ProbeError;
use crate::options::{DEFAULT_PING_ATTEMPTS, DEFAULT_PROBE_ATTEMPTS, ProbeOptions};
use crate::report::{ProbeReport, aggregate};

/// Probe a TCP endpoint. Runs a single attempt unless `options.attempts`
/// says otherwise.
///
/// Returns `Err` only when the options violate the invocation contract,
/// before anything is dialed. Faults inside an attempt never bubble up here;
/// they are recorded per attempt in the report.
pub async fn probe(options: ProbeOptions) -> Result<ProbeReport, ProbeError> {
    run(options, DEFAULT_PROBE_ATTEMPTS).await
}

/// Same contract as [`probe`], with `attempts` defaulting to 10.
pub async fn ping(options: ProbeOptions) -> Result<ProbeReport, ProbeError> {
    run(options, DEFAULT_PING_ATTEMPTS).await
}

async fn run(options: ProbeOptions, default_attempts: u32) -> Result<ProbeReport, ProbeError> {
    let config = options.resolve(default_attempts)?;

    // Attempts run strictly one after another; the next starts only once the
    // previous one has finalized and its result is recorded.
    let mut results = Vec::with_capacity(config.attempts as usize);
    for seq in 0..config.attempts {
        let result = attempt::run(&config, seq).await;
        debug!(
            "attempt {}/{} to {}:{} finalized (connected: {})",
            seq + 1,
            config.attempts,
            config.address,
            config.port,
            result.connect_time.is_some()
        );
        results.push(result);
    }
    Ok(aggregate(&config, results))
}
