//! Readiness detection for the child server.
//!
//! Several independent sources (stderr marker, HTTP probe, child exit) race
//! to settle a single [`ReadySignal`]. The first settlement is the outcome;
//! every later one is dropped.

use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::time::{interval_at, MissedTickBehavior};

use crate::error::LaunchError;

const MIN_REQUEST_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadySource {
    StreamMarker,
    HttpProbe,
}

impl ReadySource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StreamMarker => "stream marker",
            Self::HttpProbe => "http probe",
        }
    }
}

pub type ReadyOutcome = Result<ReadySource, LaunchError>;

#[derive(Clone)]
pub struct ReadySignal {
    tx: Arc<Mutex<Option<oneshot::Sender<ReadyOutcome>>>>,
}

impl ReadySignal {
    pub fn new() -> (Self, oneshot::Receiver<ReadyOutcome>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Returns `true` only for the call that settled the signal.
    pub fn settle(&self, outcome: ReadyOutcome) -> bool {
        let sender = match self.tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            Some(tx) => {
                // The receiver may be gone if the launch was abandoned.
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    pub fn is_settled(&self) -> bool {
        match self.tx.lock() {
            Ok(guard) => guard.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }
}

pub fn server_url(host: IpAddr, port: u16) -> String {
    match host {
        IpAddr::V4(v4) => format!("http://{v4}:{port}/"),
        IpAddr::V6(v6) => format!("http://[{v6}]:{port}/"),
    }
}

/// Polls `http://host:port/` every `interval` until any HTTP response
/// arrives. Connection failures only count against `max_attempts`.
pub async fn wait_until_ready(
    host: IpAddr,
    port: u16,
    interval: Duration,
    max_attempts: u32,
) -> Result<(), LaunchError> {
    let client = reqwest::Client::builder()
        .no_proxy()
        .timeout(interval.max(MIN_REQUEST_TIMEOUT))
        .build()?;
    let url = server_url(host, port);
    let started = Instant::now();
    let mut ticker = interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut attempts = 0;
    loop {
        ticker.tick().await;
        attempts += 1;
        match client.get(&url).send().await {
            Ok(response) => {
                log::info!(
                    "Shiny server responded with {} after {attempts} attempt(s)",
                    response.status()
                );
                return Ok(());
            }
            Err(err) => {
                log::debug!("Readiness probe {attempts}/{max_attempts} failed: {err}");
                if attempts >= max_attempts {
                    return Err(LaunchError::ReadinessTimeout {
                        attempts,
                        waited: started.elapsed(),
                    });
                }
            }
        }
    }
}

/// Runs the probe and feeds its result into `signal`.
pub async fn probe_into(
    signal: ReadySignal,
    host: IpAddr,
    port: u16,
    interval: Duration,
    max_attempts: u32,
) {
    let outcome = wait_until_ready(host, port, interval, max_attempts)
        .await
        .map(|()| ReadySource::HttpProbe);
    if !signal.settle(outcome) {
        log::debug!("Readiness already settled, ignoring probe result");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind((LOOPBACK, 0)).await.unwrap();
        listener.local_addr().unwrap().port()
    }

    async fn serve_status(status_line: &'static str) -> u16 {
        let listener = TcpListener::bind((LOOPBACK, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let response = format!("{status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });
        port
    }

    #[test]
    fn only_the_first_settlement_counts() {
        let (signal, mut rx) = ReadySignal::new();
        assert!(!signal.is_settled());
        assert!(signal.settle(Ok(ReadySource::StreamMarker)));
        assert!(!signal.clone().settle(Ok(ReadySource::HttpProbe)));
        assert!(!signal.settle(Err(LaunchError::UnexpectedChildExit { code: Some(1) })));
        assert!(signal.is_settled());
        assert_eq!(rx.try_recv().unwrap().unwrap(), ReadySource::StreamMarker);
    }

    #[test]
    fn settling_after_receiver_dropped_is_harmless() {
        let (signal, rx) = ReadySignal::new();
        drop(rx);
        assert!(signal.settle(Ok(ReadySource::HttpProbe)));
    }

    #[test]
    fn url_formats_loopback_hosts() {
        assert_eq!(server_url(LOOPBACK, 3838), "http://127.0.0.1:3838/");
        assert_eq!(
            server_url(IpAddr::V6(std::net::Ipv6Addr::LOCALHOST), 80),
            "http://[::1]:80/"
        );
    }

    #[tokio::test]
    async fn any_http_status_counts_as_ready() {
        let port = serve_status("HTTP/1.1 500 Internal Server Error").await;
        let result = wait_until_ready(LOOPBACK, port, Duration::from_millis(20), 50).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn times_out_after_max_attempts() {
        let port = closed_port().await;
        let started = Instant::now();
        let result = wait_until_ready(LOOPBACK, port, Duration::from_millis(20), 5).await;

        match result {
            Err(LaunchError::ReadinessTimeout { attempts, waited }) => {
                assert_eq!(attempts, 5);
                assert!(waited >= Duration::from_millis(100));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn probe_feeds_the_signal() {
        let port = serve_status("HTTP/1.1 200 OK").await;
        let (signal, rx) = ReadySignal::new();
        probe_into(signal.clone(), LOOPBACK, port, Duration::from_millis(20), 50).await;
        assert!(signal.is_settled());
        assert_eq!(rx.await.unwrap().unwrap(), ReadySource::HttpProbe);
    }
}
