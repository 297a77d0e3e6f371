//! Leader watcher over an election path.

use crate::election::MemberSelector;
use crate::session::CoordinationSession;
use crate::subscribers::{deliver, DeliveryStats, LeaderChanged, SubscriberList, Subscription};
use crate::{DetectorConfig, DetectorError, DetectorResult};
use leadwire_core::coordination::{
    join_path, ChildWatch, Connector, CoordinationClient, SessionEvent, SessionEvents,
};
use leadwire_core::{CoreError, ElectionMember, LeaderInfo, LeaderView, PayloadCodec};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Tracks the leader of an election path and notifies callbacks of every
/// distinct transition.
///
/// The leader is the live member with the lowest sequence token. Callbacks
/// run one at a time, in registration order, and never see the same view
/// twice.
///
/// ```rust,no_run
/// use leadwire_detector::{DetectorConfig, LeaderWatcher};
/// use leadwire_core::LeaderView;
/// # async fn example(connector: std::sync::Arc<dyn leadwire_core::coordination::Connector>) -> leadwire_detector::DetectorResult<()> {
/// let config = DetectorConfig::from_url("zk://127.0.0.1:2181/mesos")?;
/// let watcher = LeaderWatcher::connect(connector, config).await?;
/// watcher
///     .detect(|view: &LeaderView| println!("leader is now {}", view))
///     .await?;
/// watcher.start().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LeaderWatcher {
    inner: Arc<Inner>,
}

struct Inner {
    config: DetectorConfig,
    selector: MemberSelector,
    session: CoordinationSession,
    events: parking_lot::Mutex<Option<SessionEvents>>,
    state: Mutex<WatchState>,
    started: AtomicBool,
    shutdown: watch::Sender<bool>,
    done: watch::Sender<bool>,
}

struct WatchState {
    published: Option<LeaderView>,
    subscribers: SubscriberList,
    stats: DeliveryStats,
    stopped: bool,
}

/// Outcome of one recomputation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Refresh {
    Settled,
    /// The leader's payload could not be read; relist after backoff
    Retry,
}

enum Fetch {
    Info(LeaderInfo),
    Vanished,
    Malformed,
    Unavailable,
}

enum Step {
    Shutdown,
    Session(Option<SessionEvent>),
    WatchFired,
    RetryDue,
}

impl LeaderWatcher {
    /// Dials the coordination ensemble named by `config`.
    pub async fn connect(connector: Arc<dyn Connector>, config: DetectorConfig) -> DetectorResult<Self> {
        config.validate()?;
        let (session, events) = CoordinationSession::dial(connector, &config).await?;
        let (shutdown, _) = watch::channel(false);
        let (done, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(Inner {
                selector: MemberSelector::new(&config.json_prefix, &config.binary_prefix),
                config,
                session,
                events: parking_lot::Mutex::new(Some(events)),
                state: Mutex::new(WatchState {
                    published: None,
                    subscribers: SubscriberList::default(),
                    stats: DeliveryStats::default(),
                    stopped: false,
                }),
                started: AtomicBool::new(false),
                shutdown,
                done,
            }),
        })
    }

    /// Arms the children watch, computes the initial leader and starts
    /// following changes in the background.
    pub async fn start(&self) -> DetectorResult<()> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(DetectorError::AlreadyStarted);
        }
        if *self.inner.shutdown.borrow() {
            return Err(DetectorError::Stopped);
        }

        let events = self
            .inner
            .events
            .lock()
            .take()
            .ok_or_else(|| DetectorError::Internal {
                reason: "session events already consumed".to_string(),
            })?;

        let (watch, refresh) = match self.inner.refresh().await {
            Ok(armed) => armed,
            Err(e) => {
                *self.inner.events.lock() = Some(events);
                self.inner.started.store(false, Ordering::SeqCst);
                // A concurrent stop saw `started` and left `done` to the loop
                if *self.inner.shutdown.borrow() {
                    self.inner.done.send_replace(true);
                }
                return Err(DetectorError::Start {
                    reason: e.to_string(),
                });
            }
        };

        info!("Watching election path {}", self.inner.config.election_path);

        let retry_at = match refresh {
            Refresh::Settled => None,
            Refresh::Retry => Some(Instant::now() + self.inner.config.read_retry.delay_for(0)),
        };
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.run(watch, events, retry_at).await;
        });

        Ok(())
    }

    /// Registers a leader-change callback.
    ///
    /// If a view has already been published, the callback is invoked with it
    /// before this returns.
    pub async fn detect(&self, callback: impl LeaderChanged + 'static) -> DetectorResult<Subscription> {
        let callback: Arc<dyn LeaderChanged> = Arc::new(callback);
        let mut state = self.inner.state.lock().await;
        if state.stopped {
            return Err(DetectorError::Stopped);
        }

        let subscription = state.subscribers.add(Arc::clone(&callback));
        if let Some(view) = state.published.clone() {
            debug!("Delivering current leader {} to new subscriber", view);
            state.stats.synthetic_deliveries += 1;
            state.stats.callbacks_invoked += 1;
            if !deliver(&subscription, callback.as_ref(), &view) {
                state.stats.callbacks_panicked += 1;
            }
        }
        Ok(subscription)
    }

    /// Removes a callback. Returns false if it was not registered.
    pub async fn cancel(&self, subscription: &Subscription) -> bool {
        self.inner.state.lock().await.subscribers.remove(subscription)
    }

    /// Stops watching and closes the coordination session. No callback runs
    /// after this returns. Idempotent.
    pub async fn stop(&self) {
        if self.inner.shutdown.send_replace(true) {
            return;
        }
        info!("Stopping leader watcher for {}", self.inner.config.election_path);

        self.inner.state.lock().await.stopped = true;
        self.inner.session.close().await;

        if !self.inner.started.load(Ordering::SeqCst) {
            self.inner.done.send_replace(true);
        }
    }

    /// Resolves once the watcher has stopped.
    pub async fn done(&self) {
        let mut done = self.inner.done.subscribe();
        let _ = done.wait_for(|done| *done).await;
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    /// Last published view, `None` before the first publication.
    pub async fn current(&self) -> Option<LeaderView> {
        self.inner.state.lock().await.published.clone()
    }

    pub async fn stats(&self) -> DeliveryStats {
        let state = self.inner.state.lock().await;
        let mut stats = state.stats.clone();
        stats.active_subscriptions = state.subscribers.len();
        stats
    }

    /// Successful session redials since `connect`.
    pub fn reconnects(&self) -> u64 {
        self.inner.session.reconnects()
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.inner.config
    }
}

impl Inner {
    async fn run(self: Arc<Self>, watch: ChildWatch, mut events: SessionEvents, mut retry_at: Option<Instant>) {
        let mut shutdown = self.shutdown.subscribe();
        let mut watch = Some(watch);
        let mut disconnected = false;
        let mut failures: u32 = 0;

        loop {
            let step = tokio::select! {
                biased;
                _ = shutdown.wait_for(|stopped| *stopped) => Step::Shutdown,
                event = events.recv() => Step::Session(event),
                _ = async {
                    match watch.as_mut() {
                        Some(pending) => {
                            if let Ok(event) = pending.await {
                                debug!("Election watch fired: {:?}", event);
                            }
                        }
                        None => std::future::pending().await,
                    }
                } => Step::WatchFired,
                _ = async {
                    match retry_at {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => std::future::pending().await,
                    }
                } => Step::RetryDue,
            };

            let relist = match step {
                Step::Shutdown => break,
                Step::Session(Some(SessionEvent::Disconnected)) => {
                    debug!("Coordination session disconnected, waiting for recovery");
                    disconnected = true;
                    false
                }
                Step::Session(Some(SessionEvent::Connected)) => {
                    let recovered = disconnected;
                    disconnected = false;
                    recovered
                }
                Step::Session(Some(SessionEvent::Expired)) | Step::Session(None) => {
                    warn!("Coordination session expired, reconnecting");
                    watch = None;
                    match self.session.reconnect(self.shutdown.subscribe()).await {
                        Some(fresh) => {
                            events = fresh;
                            disconnected = false;
                            true
                        }
                        None => break,
                    }
                }
                Step::WatchFired => {
                    // One-shot: consumed whether it fired or was discarded
                    watch = None;
                    true
                }
                Step::RetryDue => true,
            };

            if !relist {
                continue;
            }

            match self.refresh().await {
                Ok((armed, Refresh::Settled)) => {
                    watch = Some(armed);
                    retry_at = None;
                    failures = 0;
                }
                Ok((armed, Refresh::Retry)) => {
                    watch = Some(armed);
                    retry_at = Some(self.backoff(&mut failures));
                }
                Err(e) => {
                    let at = self.backoff(&mut failures);
                    warn!(
                        "Failed to list {}: {}, retrying in {:?}",
                        self.config.election_path,
                        e,
                        at.saturating_duration_since(Instant::now())
                    );
                    retry_at = Some(at);
                }
            }
        }

        debug!("Leader watcher loop for {} exited", self.config.election_path);
        self.done.send_replace(true);
    }

    fn backoff(&self, failures: &mut u32) -> Instant {
        let delay = self.config.read_retry.delay_for(*failures);
        *failures = failures.saturating_add(1);
        Instant::now() + delay
    }

    /// Relists members, re-arming the children watch in the same call, and
    /// recomputes the leader.
    async fn refresh(&self) -> DetectorResult<(ChildWatch, Refresh)> {
        let client = self.session.client()?;
        let (names, watch) = client.children_watch(&self.config.election_path).await?;
        let refresh = self.recompute(client.as_ref(), &names).await;
        Ok((watch, refresh))
    }

    async fn recompute(&self, client: &dyn CoordinationClient, names: &[String]) -> Refresh {
        let mut state = self.state.lock().await;
        if state.stopped {
            return Refresh::Settled;
        }
        state.stats.evaluations += 1;

        let last = state.published.as_ref().and_then(LeaderView::token);
        let view = match self.selector.select(names) {
            None => {
                // Nothing published yet, or already absent
                if last.is_none() {
                    return Refresh::Settled;
                }
                LeaderView::Absent
            }
            Some(member) if Some(member.sequence) == last => return Refresh::Settled,
            Some(member) => match self.fetch_info(client, &member).await {
                Fetch::Info(info) => LeaderView::present(member, info),
                Fetch::Vanished | Fetch::Malformed => return Refresh::Settled,
                Fetch::Unavailable => return Refresh::Retry,
            },
        };

        match &state.published {
            Some(previous) => info!("Leader changed from {} to {}", previous, view),
            None => info!("Leader detected: {}", view),
        }

        let (invoked, panicked) = state.subscribers.publish(&view);
        state.published = Some(view);
        state.stats.transitions_published += 1;
        state.stats.callbacks_invoked += invoked;
        state.stats.callbacks_panicked += panicked;
        Refresh::Settled
    }

    async fn fetch_info(&self, client: &dyn CoordinationClient, member: &ElectionMember) -> Fetch {
        let path = join_path(&self.config.election_path, &member.name);
        let retry = &self.config.read_retry;
        let mut attempt: u32 = 0;

        loop {
            match client.get(&path).await {
                Ok((data, _)) => {
                    return match member.format.codec().decode::<LeaderInfo>(&data) {
                        Ok(info) => Fetch::Info(info),
                        Err(e) => {
                            error!("Malformed leader info in {}: {}", path, e);
                            Fetch::Malformed
                        }
                    };
                }
                Err(CoreError::NoNode { .. }) => {
                    debug!("Member {} vanished before its payload was read", member.name);
                    return Fetch::Vanished;
                }
                Err(e) if e.is_retryable() && (attempt as usize) + 1 < retry.max_attempts => {
                    let delay = retry.delay_for(attempt);
                    warn!("Failed to read {}: {}, retrying in {:?}", path, e, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!("Giving up reading {} after {} attempts: {}", path, attempt + 1, e);
                    return Fetch::Unavailable;
                }
            }
        }
    }
}
