//! Single-attempt execution.
//!
//! An attempt moves `Connecting -> Connected -> Finalized`. Several event
//! sources race toward finalization (match success, byte-cap overflow, peer
//! close, transport errors, the response deadline and the idle ceiling); the
//! first one to claim the attempt decides its outcome and every later event
//! is a no-op. The response deadline is armed when the attempt starts, so it
//! also bounds a connect that drags on.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{self, Instant};

use crate::error::ProbeError;
use crate::options::{Mode, ProbeConfig};
use crate::report::AttemptResult;

/// Read granularity for the response buffer.
const READ_CHUNK: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Connecting,
    Connected,
    Finalized,
}

/// Terminal event that claimed an attempt.
enum Cause {
    /// The matcher accepted the accumulated buffer.
    Matched,
    /// The peer closed the connection.
    Closed,
    /// The buffer grew past the configured cap.
    Overflow,
    /// The connection could not be established.
    ConnectFailed(std::io::Error),
    /// The connect ceiling elapsed first.
    ConnectTimeout,
    /// The response deadline elapsed first.
    DeadlineElapsed,
    /// The idle ceiling elapsed on an established connection.
    Idle,
    /// The established connection failed.
    TransportFailed(std::io::Error),
}

impl Cause {
    fn into_error(self) -> Option<ProbeError> {
        match self {
            Cause::Matched | Cause::Closed => None,
            Cause::Overflow => Some(ProbeError::MaxResponseBytesExceeded),
            Cause::ConnectFailed(err) => Some(ProbeError::Connect(err)),
            Cause::ConnectTimeout => Some(ProbeError::ConnectTimeout),
            Cause::DeadlineElapsed => Some(ProbeError::ResponseTimeout),
            Cause::Idle => Some(ProbeError::SocketTimeout),
            Cause::TransportFailed(err) => Some(ProbeError::Transport(err)),
        }
    }
}

struct AttemptState<'a> {
    config: &'a ProbeConfig,
    seq: u32,
    started: Instant,
    phase: Phase,
    connect_time: Option<Duration>,
    time: Option<Duration>,
    error: Option<ProbeError>,
    buf: Vec<u8>,
    matched: Option<bool>,
}

impl<'a> AttemptState<'a> {
    fn new(config: &'a ProbeConfig, seq: u32) -> Self {
        AttemptState {
            config,
            seq,
            started: Instant::now(),
            phase: Phase::Connecting,
            connect_time: None,
            time: None,
            error: None,
            buf: Vec::new(),
            matched: None,
        }
    }

    fn live(&self) -> bool {
        self.phase != Phase::Finalized
    }

    /// Enter `Connected`. The attempt now owns a response buffer, so a
    /// configured matcher gets its initial negative verdict.
    fn connected(&mut self) {
        self.phase = Phase::Connected;
        self.connect_time = Some(self.started.elapsed());
        if self.config.matcher.is_some() {
            self.matched = Some(false);
        }
    }

    /// Claim the terminal cause. The first claim wins; anything racing in
    /// after it is dropped.
    fn claim(&mut self, cause: Cause) {
        if self.phase == Phase::Finalized {
            return;
        }
        if self.phase == Phase::Connected {
            self.time = Some(self.started.elapsed());
        }
        self.error = cause.into_error();
        self.phase = Phase::Finalized;
    }

    /// Fold a received chunk into the buffer, cap it, and re-run the match
    /// test. A positive match claims the attempt; so does an overflow, unless
    /// the truncated buffer matched in the same chunk.
    fn ingest(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
        let overflowed = self.buf.len() > self.config.max_response_bytes;
        if overflowed {
            self.buf.truncate(self.config.max_response_bytes);
        }
        if let Some(matcher) = &self.config.matcher {
            let hit = matcher.is_match(&self.buf, self.config);
            self.matched = Some(hit);
            if hit {
                self.claim(Cause::Matched);
                return;
            }
        }
        if overflowed {
            self.claim(Cause::Overflow);
        }
    }

    fn into_result(mut self) -> AttemptResult {
        let bytes_received = (!self.buf.is_empty()).then_some(self.buf.len());
        let data = (self.config.capture && !self.buf.is_empty())
            .then(|| std::mem::take(&mut self.buf));
        AttemptResult {
            seq: self.seq,
            connect_time: self.connect_time,
            time: self.time,
            matched: self.matched,
            error: self.error,
            bytes_received,
            data,
        }
    }
}

/// Run one attempt to completion. Never fails: faults are recorded in the
/// returned result.
pub(crate) async fn run(config: &ProbeConfig, seq: u32) -> AttemptResult {
    match config.mode {
        Mode::Plain => plain(config, seq).await,
        Mode::Probe => probe(config, seq).await,
    }
}

/// Plain mode: time the bare connect, then close. The transport hands over
/// exactly one of success, error or elapsed ceiling, so no claim arbitration
/// is needed here.
async fn plain(config: &ProbeConfig, seq: u32) -> AttemptResult {
    let started = Instant::now();
    let connect = TcpStream::connect((config.address.as_str(), config.port));
    let (connect_time, error) = match time::timeout(config.timeout, connect).await {
        Ok(Ok(stream)) => {
            let elapsed = started.elapsed();
            // the socket closes right away, so a nodelay failure is moot
            let _ = stream.set_nodelay(config.no_delay);
            drop(stream);
            (Some(elapsed), None)
        }
        Ok(Err(err)) => (None, Some(ProbeError::Connect(err))),
        Err(_) => (None, Some(ProbeError::ConnectTimeout)),
    };
    AttemptResult {
        seq,
        connect_time,
        // plain mode measures nothing past the connect
        time: connect_time,
        matched: None,
        error,
        bytes_received: None,
        data: None,
    }
}

/// Probe mode: connect, write the request, then read, cap and match the
/// response until one of the racing event sources claims the attempt.
async fn probe(config: &ProbeConfig, seq: u32) -> AttemptResult {
    let mut state = AttemptState::new(config, seq);

    let deadline = time::sleep_until(state.started + config.response_timeout);
    tokio::pin!(deadline);

    let connect = time::timeout(
        config.timeout,
        TcpStream::connect((config.address.as_str(), config.port)),
    );
    let stream = tokio::select! {
        res = connect => match res {
            Ok(Ok(stream)) => Some(stream),
            Ok(Err(err)) => {
                state.claim(Cause::ConnectFailed(err));
                None
            }
            Err(_) => {
                state.claim(Cause::ConnectTimeout);
                None
            }
        },
        _ = &mut deadline => {
            state.claim(Cause::DeadlineElapsed);
            None
        }
    };
    let Some(mut stream) = stream else {
        return state.into_result();
    };

    state.connected();
    if let Err(err) = stream.set_nodelay(config.no_delay) {
        state.claim(Cause::TransportFailed(err));
        return finish(state, stream).await;
    }

    if !config.request.is_empty() {
        tokio::select! {
            res = time::timeout(config.timeout, stream.write_all(&config.request)) => match res {
                Ok(Ok(())) => {}
                Ok(Err(err)) => state.claim(Cause::TransportFailed(err)),
                Err(_) => state.claim(Cause::Idle),
            },
            _ = &mut deadline => state.claim(Cause::DeadlineElapsed),
        }
    }

    // The idle ceiling restarts on every read; the deadline does not.
    let mut chunk = [0u8; READ_CHUNK];
    while state.live() {
        tokio::select! {
            res = time::timeout(config.timeout, stream.read(&mut chunk)) => match res {
                Ok(Ok(0)) => state.claim(Cause::Closed),
                Ok(Ok(n)) => state.ingest(&chunk[..n]),
                Ok(Err(err)) => state.claim(Cause::TransportFailed(err)),
                Err(_) => state.claim(Cause::Idle),
            },
            _ = &mut deadline => state.claim(Cause::DeadlineElapsed),
        }
    }

    finish(state, stream).await
}

/// Common tail for every finalized probe-mode attempt that got a socket:
/// best-effort exit payload, orderly close, result.
async fn finish(state: AttemptState<'_>, mut stream: TcpStream) -> AttemptResult {
    if let Some(exit) = &state.config.exit_request {
        // the peer may already be gone; losing this payload is acceptable
        let _ = stream.try_write(exit);
    }
    let _ = stream.shutdown().await;
    state.into_result()
}
