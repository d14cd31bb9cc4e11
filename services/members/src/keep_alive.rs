use crate::config::KeepAliveConfig;
use anyhow::{Context, Result};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Periodically requests this service's public ping URL so the hosting
/// platform does not suspend it for inactivity.
pub struct KeepAlive {
    client: reqwest::Client,
    url: String,
    period: Duration,
}

impl KeepAlive {
    /// Build a pinger, or `None` when no URL is configured
    pub fn from_config(config: &KeepAliveConfig) -> Result<Option<Self>> {
        let Some(url) = config.url.clone() else {
            return Ok(None);
        };
        anyhow::ensure!(
            config.interval_secs > 0,
            "keep_alive.interval_secs must be greater than zero"
        );

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build keep-alive HTTP client")?;

        Ok(Some(Self {
            client,
            url,
            period: config.interval(),
        }))
    }

    /// Tick forever; the first ping fires one period after start
    pub async fn run(self) {
        info!(url = %self.url, period_secs = self.period.as_secs(), "Keep-alive pinger started");

        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            // Outcome only matters to the log.
            let _ = self.ping_once().await;
        }
    }

    /// Issue a single ping and log the outcome
    pub async fn ping_once(&self) -> Result<u16, reqwest::Error> {
        debug!(url = %self.url, "Sending keep-alive ping");

        match self.client.get(&self.url).send().await {
            Ok(response) => {
                let status = response.status();
                info!(status = status.as_u16(), "Keep-alive ping answered");
                metrics::counter!("keep_alive.pings").increment(1);
                Ok(status.as_u16())
            }
            Err(e) => {
                warn!(error = %e, "Keep-alive ping failed");
                metrics::counter!("keep_alive.failures").increment(1);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::Router;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn keep_alive_config(url: Option<String>, interval_secs: u64) -> KeepAliveConfig {
        KeepAliveConfig {
            url,
            interval_secs,
            timeout_secs: 2,
        }
    }

    async fn spawn_counter() -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/ping",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    "pong"
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        (format!("http://{addr}/ping"), hits)
    }

    #[test]
    fn test_disabled_without_url() {
        let pinger = KeepAlive::from_config(&keep_alive_config(None, 300)).unwrap();
        assert!(pinger.is_none());
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let result = KeepAlive::from_config(&keep_alive_config(
            Some("http://127.0.0.1:9/ping".to_string()),
            0,
        ));

        let err = result.err().expect("zero interval must be rejected");
        assert!(err.to_string().contains("interval_secs"));
    }

    #[tokio::test]
    async fn test_ping_once_reports_status() {
        let (url, hits) = spawn_counter().await;
        let pinger = KeepAlive::from_config(&keep_alive_config(Some(url), 300))
            .unwrap()
            .unwrap();

        assert_eq!(pinger.ping_once().await.unwrap(), 200);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_ping_is_returned_not_raised() {
        let pinger = KeepAlive::from_config(&keep_alive_config(
            Some("http://127.0.0.1:9/ping".to_string()),
            300,
        ))
        .unwrap()
        .unwrap();

        assert!(pinger.ping_once().await.is_err());
    }

    #[tokio::test]
    async fn test_run_waits_one_period_before_first_ping() {
        let (url, hits) = spawn_counter().await;
        let pinger = KeepAlive::from_config(&keep_alive_config(Some(url), 1))
            .unwrap()
            .unwrap();

        let handle = tokio::spawn(pinger.run());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(hits.load(Ordering::SeqCst) >= 1);

        handle.abort();
    }

    #[tokio::test]
    async fn test_run_keeps_ticking_after_failed_ping() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        // First connection is dropped unanswered, later ones get a 200.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/ping", listener.local_addr().unwrap());
        let answered = Arc::new(AtomicUsize::new(0));
        let counter = answered.clone();
        tokio::spawn(async move {
            let mut accepted = 0;
            loop {
                let (mut socket, _) = listener.accept().await.unwrap();
                accepted += 1;
                if accepted == 1 {
                    drop(socket);
                    continue;
                }
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 4\r\nconnection: close\r\n\r\npong")
                    .await;
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        let pinger = KeepAlive::from_config(&keep_alive_config(Some(url), 1))
            .unwrap()
            .unwrap();
        let handle = tokio::spawn(pinger.run());

        // Tick one (~1s) hits the dropped connection, tick two (~2s) is answered.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(answered.load(Ordering::SeqCst), 0);
        assert!(!handle.is_finished());

        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert!(answered.load(Ordering::SeqCst) >= 1);
        assert!(!handle.is_finished());

        handle.abort();
    }
}
