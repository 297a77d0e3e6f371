//! Coordination session ownership with reconnect-on-expiry.

use crate::{DetectorConfig, DetectorError, DetectorResult};
use leadwire_core::coordination::{Connector, CoordinationClient, SessionEvents};
use leadwire_core::RetryConfig;
use parking_lot::RwLock;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Owns the watcher's connection to the coordination ensemble.
///
/// The underlying client is swapped when an expired session is redialed.
pub struct CoordinationSession {
    connector: Arc<dyn Connector>,
    hosts: Vec<String>,
    dial_timeout: Duration,
    backoff: RetryConfig,
    client: RwLock<Option<Arc<dyn CoordinationClient>>>,
    reconnects: AtomicU64,
}

impl CoordinationSession {
    /// Dials the ensemble, failing with `Connection` when no host answers
    /// within the dial timeout.
    pub async fn dial(
        connector: Arc<dyn Connector>,
        config: &DetectorConfig,
    ) -> DetectorResult<(Self, SessionEvents)> {
        let session = Self {
            connector,
            hosts: config.hosts.clone(),
            dial_timeout: config.dial_timeout,
            backoff: config.reconnect_backoff.clone(),
            client: RwLock::new(None),
            reconnects: AtomicU64::new(0),
        };

        let (client, events) = session.open().await?;
        *session.client.write() = Some(client);
        info!("Connected to coordination ensemble {:?}", session.hosts);
        Ok((session, events))
    }

    /// Live client, or `Stopped` once the session has been closed.
    pub fn client(&self) -> DetectorResult<Arc<dyn CoordinationClient>> {
        self.client.read().clone().ok_or(DetectorError::Stopped)
    }

    /// Number of successful redials since the first dial.
    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    /// Redials after session expiry, backing off with jitter between
    /// failures until a dial succeeds or shutdown is signalled.
    ///
    /// Returns the event stream of the new session, `None` on shutdown.
    pub async fn reconnect(&self, mut shutdown: watch::Receiver<bool>) -> Option<SessionEvents> {
        let mut attempt: u32 = 0;
        loop {
            if *shutdown.borrow() {
                return None;
            }

            match self.open().await {
                Ok((client, events)) => {
                    let previous = {
                        let mut slot = self.client.write();
                        if slot.is_some() {
                            slot.replace(Arc::clone(&client))
                        } else {
                            None
                        }
                    };
                    match previous {
                        Some(previous) => previous.close().await,
                        None => {
                            // Closed while dialing
                            client.close().await;
                            return None;
                        }
                    }
                    self.reconnects.fetch_add(1, Ordering::Relaxed);
                    info!(
                        "Reconnected to coordination ensemble {:?} after {} failed attempts",
                        self.hosts, attempt
                    );
                    return Some(events);
                }
                Err(e) => {
                    let delay = self.jittered(attempt);
                    warn!("Reconnect attempt {} failed: {}, retrying in {:?}", attempt + 1, e, delay);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.wait_for(|stopped| *stopped) => return None,
                    }
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    /// Closes the session. Subsequent `client` calls fail with `Stopped`.
    pub async fn close(&self) {
        let client = self.client.write().take();
        if let Some(client) = client {
            debug!("Closing coordination session");
            client.close().await;
        }
    }

    async fn open(&self) -> DetectorResult<(Arc<dyn CoordinationClient>, SessionEvents)> {
        match tokio::time::timeout(self.dial_timeout, self.connector.connect(&self.hosts)).await {
            Ok(Ok(opened)) => Ok(opened),
            Ok(Err(e)) => Err(DetectorError::Connection {
                hosts: self.hosts.clone(),
                reason: e.to_string(),
            }),
            Err(_) => Err(DetectorError::Connection {
                hosts: self.hosts.clone(),
                reason: format!("no host answered within {:?}", self.dial_timeout),
            }),
        }
    }

    fn jittered(&self, attempt: u32) -> Duration {
        let delay = self.backoff.delay_for(attempt);
        let spread = (delay.as_millis() as u64 / 4).max(1);
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
    }
}
