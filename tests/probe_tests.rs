//! End-to-end probe tests against loopback listeners.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use tcp_probe::{Matcher, ProbeError, ProbeOptions, ping, probe};

async fn bind_local() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback listener");
    let port = listener.local_addr().expect("listener addr").port();
    (listener, port)
}

fn local_options(port: u16) -> ProbeOptions {
    ProbeOptions {
        address: "127.0.0.1".to_string(),
        port,
        ..ProbeOptions::default()
    }
}

/// Accepts connections forever and echoes whatever arrives back to the peer.
fn spawn_echo_server(listener: TcpListener) {
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => {
                            if socket.write_all(&buf[..n]).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            });
        }
    });
}

/// Accepts connections and holds them open without ever writing back.
fn spawn_silent_server(listener: TcpListener) {
    tokio::spawn(async move {
        let mut held = Vec::new();
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                return;
            };
            held.push(socket);
        }
    });
}

#[tokio::test]
async fn closed_port_records_connect_error() {
    let (listener, port) = bind_local().await;
    drop(listener); // nothing listens on this port anymore

    let report = probe(local_options(port)).await.unwrap();

    assert_eq!(report.attempts, 1);
    assert_eq!(report.results.len(), 1);
    let attempt = &report.results[0];
    assert!(attempt.connect_time.is_none());
    assert!(attempt.time.is_none());
    assert!(matches!(attempt.error, Some(ProbeError::Connect(_))));
    assert_eq!(report.dropped, 1);
    assert!(report.avg.is_none());
    assert!(report.min.is_none());
    assert!(report.max.is_none());
}

#[tokio::test]
async fn plain_mode_times_the_connect_only() {
    let (_listener, port) = bind_local().await;

    let report = probe(local_options(port)).await.unwrap();

    assert_eq!(report.attempts, 1);
    let attempt = &report.results[0];
    assert!(attempt.error.is_none());
    assert!(attempt.connect_time.is_some());
    assert_eq!(attempt.time, attempt.connect_time);
    assert!(attempt.matched.is_none());
    assert!(attempt.bytes_received.is_none());
    assert!(attempt.data.is_none());
    assert_eq!(report.dropped, 0);
    // plain mode carries no probe-only aggregates
    assert!(report.matches.is_none());
    assert!(report.errors.is_none());
    assert!(report.con_avg.is_none());
    assert!(report.avg.is_some());
}

#[tokio::test]
async fn echoed_request_matches_and_is_captured() {
    let (listener, port) = bind_local().await;
    spawn_echo_server(listener);

    let report = probe(ProbeOptions {
        request: Some(b"PING".to_vec()),
        matcher: Some(Matcher::bytes("PING")),
        capture: true,
        ..local_options(port)
    })
    .await
    .unwrap();

    let attempt = &report.results[0];
    assert_eq!(attempt.matched, Some(true));
    assert!(attempt.error.is_none());
    assert_eq!(attempt.bytes_received, Some(4));
    assert_eq!(attempt.data.as_deref(), Some(&b"PING"[..]));

    let connect_time = attempt.connect_time.unwrap();
    let time = attempt.time.unwrap();
    assert!(time >= connect_time);

    assert_eq!(report.matches, Some(1));
    assert_eq!(report.errors, Some(0));
    assert!(report.con_avg.is_some());
    assert_eq!(report.avg, attempt.time);
}

#[tokio::test]
async fn silent_server_hits_the_response_deadline() {
    let (listener, port) = bind_local().await;
    spawn_silent_server(listener);

    let started = std::time::Instant::now();
    let report = probe(ProbeOptions {
        request: Some(b"anyone there?".to_vec()),
        response_timeout_ms: Some(200),
        ..local_options(port)
    })
    .await
    .unwrap();
    let elapsed = started.elapsed();

    let attempt = &report.results[0];
    assert!(matches!(attempt.error, Some(ProbeError::ResponseTimeout)));
    assert!(attempt.connect_time.is_some());
    assert!(attempt.time.unwrap() >= Duration::from_millis(200));
    // the deadline, not the 5s idle ceiling, ended the attempt
    assert!(elapsed < Duration::from_secs(4));
    assert_eq!(report.errors, Some(1));
    assert_eq!(report.dropped, 0);
}

#[tokio::test]
async fn idle_connection_hits_the_socket_timeout() {
    let (listener, port) = bind_local().await;
    spawn_silent_server(listener);

    let report = probe(ProbeOptions {
        capture: true,
        timeout_ms: 300,
        response_timeout_ms: Some(2_000),
        ..local_options(port)
    })
    .await
    .unwrap();

    let attempt = &report.results[0];
    assert!(matches!(attempt.error, Some(ProbeError::SocketTimeout)));
    assert!(attempt.connect_time.is_some());
    let time = attempt.time.unwrap();
    assert!(time >= Duration::from_millis(300));
    assert!(time < Duration::from_millis(2_000));
}

#[tokio::test]
async fn flooding_server_hits_the_byte_cap() {
    let (listener, port) = bind_local().await;
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let payload = vec![b'a'; 100_000];
                let _ = socket.write_all(&payload).await;
                // hold the socket so the cap, not EOF, ends the attempt
                tokio::time::sleep(Duration::from_secs(5)).await;
            });
        }
    });

    let report = probe(ProbeOptions {
        max_response_bytes: Some(1_000),
        ..local_options(port)
    })
    .await
    .unwrap();

    let attempt = &report.results[0];
    assert!(matches!(
        attempt.error,
        Some(ProbeError::MaxResponseBytesExceeded)
    ));
    assert_eq!(attempt.bytes_received, Some(1_000));
    assert!(attempt.matched.is_none());
    assert_eq!(report.errors, Some(1));
}

#[tokio::test]
async fn ping_defaults_to_ten_attempts() {
    let (_listener, port) = bind_local().await;

    let report = ping(local_options(port)).await.unwrap();

    assert_eq!(report.attempts, 10);
    assert_eq!(report.results.len(), 10);
    for (i, attempt) in report.results.iter().enumerate() {
        assert_eq!(attempt.seq, i as u32);
        assert!(attempt.error.is_none());
    }
    assert_eq!(report.dropped, 0);
    assert!(report.avg.is_some());
    assert!(report.min.unwrap() <= report.max.unwrap());
}

#[tokio::test]
async fn explicit_attempts_override_the_ping_default() {
    let (_listener, port) = bind_local().await;

    let report = ping(ProbeOptions {
        attempts: Some(3),
        ..local_options(port)
    })
    .await
    .unwrap();

    assert_eq!(report.attempts, 3);
    assert_eq!(report.results.len(), 3);
}

#[tokio::test]
async fn every_attempt_is_recorded_even_when_all_fail() {
    let (listener, port) = bind_local().await;
    drop(listener);

    let report = probe(ProbeOptions {
        attempts: Some(3),
        capture: true,
        ..local_options(port)
    })
    .await
    .unwrap();

    assert_eq!(report.results.len(), 3);
    for (i, attempt) in report.results.iter().enumerate() {
        assert_eq!(attempt.seq, i as u32);
        assert!(attempt.error.is_some());
    }
    assert_eq!(report.dropped, 3);
    assert_eq!(report.errors, Some(3));
    assert!(report.avg.is_none());
    assert!(report.con_avg.is_none());
}

#[tokio::test]
async fn exit_request_reaches_the_peer_before_close() {
    let (listener, port) = bind_local().await;
    let (tx, rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut received = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    received.extend_from_slice(&buf[..n]);
                    if received.ends_with(b"HELLO") {
                        let _ = socket.write_all(b"HELLO").await;
                    }
                }
            }
        }
        let _ = tx.send(received);
    });

    let report = probe(ProbeOptions {
        request: Some(b"HELLO".to_vec()),
        exit_request: Some(b"BYE".to_vec()),
        matcher: Some(Matcher::bytes("HELLO")),
        ..local_options(port)
    })
    .await
    .unwrap();

    assert_eq!(report.results[0].matched, Some(true));

    let received = rx.await.expect("server saw the whole exchange");
    assert!(received.starts_with(b"HELLO"));
    assert!(received.ends_with(b"BYE"));
}

#[tokio::test]
async fn exit_request_still_reaches_the_peer_after_a_deadline() {
    let (listener, port) = bind_local().await;
    let (tx, rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        // never answer; just collect what the peer sends until it closes
        let mut received = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => received.extend_from_slice(&buf[..n]),
            }
        }
        let _ = tx.send(received);
    });

    let report = probe(ProbeOptions {
        request: Some(b"HELLO".to_vec()),
        exit_request: Some(b"BYE".to_vec()),
        response_timeout_ms: Some(200),
        ..local_options(port)
    })
    .await
    .unwrap();

    let attempt = &report.results[0];
    assert!(matches!(attempt.error, Some(ProbeError::ResponseTimeout)));
    assert!(attempt.connect_time.is_some());

    let received = rx.await.expect("server saw the stream to its end");
    assert!(received.starts_with(b"HELLO"));
    assert!(received.ends_with(b"BYE"));
}

#[tokio::test]
async fn regex_matcher_accepts_a_banner() {
    let (listener, port) = bind_local().await;
    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let _ = socket.write_all(b"220 mail.example.test ESMTP ready\r\n").await;
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let report = probe(ProbeOptions {
        matcher: Some(Matcher::regex(r"^220 \S+ ESMTP").unwrap()),
        response_timeout_ms: Some(2_000),
        ..local_options(port)
    })
    .await
    .unwrap();

    let attempt = &report.results[0];
    assert_eq!(attempt.matched, Some(true));
    assert!(attempt.error.is_none());
    assert_eq!(report.matches, Some(1));
}

#[tokio::test]
async fn predicate_matcher_decides_on_the_buffer() {
    let (listener, port) = bind_local().await;
    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let _ = socket.write_all("一二三四五六".as_bytes()).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let report = probe(ProbeOptions {
        matcher: Some(Matcher::predicate(|buf, config| {
            buf.len() >= 6 && config.port != 0
        })),
        response_timeout_ms: Some(2_000),
        ..local_options(port)
    })
    .await
    .unwrap();

    assert_eq!(report.results[0].matched, Some(true));
}

#[tokio::test]
async fn close_without_match_keeps_the_negative_verdict() {
    let (listener, port) = bind_local().await;
    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let _ = socket.write_all(b"NOPE").await;
        // orderly close; the probe sees EOF with no match
    });

    let report = probe(ProbeOptions {
        matcher: Some(Matcher::bytes("YES")),
        capture: true,
        ..local_options(port)
    })
    .await
    .unwrap();

    let attempt = &report.results[0];
    assert_eq!(attempt.matched, Some(false));
    assert!(attempt.error.is_none());
    assert_eq!(attempt.bytes_received, Some(4));
    assert_eq!(attempt.data.as_deref(), Some(&b"NOPE"[..]));
    assert!(attempt.time.is_some());
    assert_eq!(report.matches, Some(0));
    assert_eq!(report.errors, Some(0));
}

#[tokio::test]
async fn unreachable_address_never_reports_timings() {
    // 192.0.2.0/24 is reserved for documentation and never routed. The
    // connect either times out or is refused by the local stack; both leave
    // the attempt without timings or a match verdict.
    let report = probe(ProbeOptions {
        timeout_ms: 250,
        matcher: Some(Matcher::bytes("never")),
        ..ProbeOptions::new("192.0.2.1", 80)
    })
    .await
    .unwrap();

    let attempt = &report.results[0];
    assert!(matches!(
        attempt.error,
        Some(ProbeError::ConnectTimeout)
            | Some(ProbeError::Connect(_))
            | Some(ProbeError::ResponseTimeout)
    ));
    assert!(attempt.connect_time.is_none());
    assert!(attempt.time.is_none());
    assert!(attempt.matched.is_none());
    assert_eq!(report.dropped, 1);
}
