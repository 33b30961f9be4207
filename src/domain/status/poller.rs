use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::api::status_dto::StatusDto;
use crate::domain::dispatch::connection::HostConnection;
use crate::domain::ids::HostName;
use crate::domain::status::snapshot::ClusterSnapshot;
use crate::error::{Error, Result};
use crate::loader::parser::parse_json_str;

/// Status query issued over the host connection, one argv cell per token.
const STATUS_QUERY: [&str; 4] = ["crm_mon", "--output-as", "json", "--inactive"];

/// Periodically queries one cluster host for status and publishes parsed
/// snapshots on a watch channel.
///
/// Polls are independent of each other and of command dispatch. A failed
/// poll leaves the previously published snapshot in place, so subscribers
/// keep working with stale state until a poll succeeds again.
#[derive(Debug)]
pub struct StatusPoller {
    connection: Arc<dyn HostConnection>,
    host: HostName,
    interval: Duration,
    publisher: watch::Sender<Option<Arc<ClusterSnapshot>>>,
    consecutive_failures: AtomicU32,
}

impl StatusPoller {
    pub fn new(connection: Arc<dyn HostConnection>, host: HostName, interval: Duration) -> Self {
        let (publisher, _) = watch::channel(None);

        Self {
            connection,
            host,
            interval,
            publisher,
            consecutive_failures: AtomicU32::new(0),
        }
    }

    /// Subscribes to snapshot updates. The receiver observes `None` until
    /// the first successful poll.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<ClusterSnapshot>>> {
        self.publisher.subscribe()
    }

    /// Most recently published snapshot, if any poll has succeeded yet.
    pub fn latest(&self) -> Option<Arc<ClusterSnapshot>> {
        self.publisher.borrow().clone()
    }

    /// Failed polls since the last successful one.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// One full poll cycle: query the host, parse the document, publish
    /// the snapshot.
    pub async fn poll_once(&self) -> Result<Arc<ClusterSnapshot>> {
        match self.poll_inner().await {
            Ok(snapshot) => {
                self.consecutive_failures.store(0, Ordering::Relaxed);
                Ok(snapshot)
            }
            Err(e) => {
                self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    async fn poll_inner(&self) -> Result<Arc<ClusterSnapshot>> {
        let argv: Vec<String> = STATUS_QUERY.iter().map(|token| token.to_string()).collect();
        let output = self.connection.execute(&argv, &self.host).await?;

        if !output.success() {
            return Err(Error::ConnectionError {
                host: self.host.to_string(),
                reason: format!("status query exited with code {}: {}", output.exit_code, output.stderr.trim()),
            });
        }

        let dto: StatusDto = parse_json_str(&output.stdout)?;
        let snapshot = Arc::new(ClusterSnapshot::from_dto(dto)?);

        log::debug!(
            "Snapshot taken via host '{}': {} node(s), {} resource(s), {} constraint(s).",
            self.host,
            snapshot.nodes.len(),
            snapshot.resources.len(),
            snapshot.constraints.len()
        );

        self.publisher.send_replace(Some(snapshot.clone()));
        Ok(snapshot)
    }

    /// Polling loop until cancelled. Poll failures are logged together
    /// with the age of the snapshot subscribers are left with.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    log::info!("Status poller for host '{}' stopped.", self.host);
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        let failures = self.consecutive_failures();
                        match self.latest() {
                            Some(previous) => log::warn!(
                                "Poll via host '{}' failed ({} in a row), keeping snapshot from {}s ago: {}",
                                self.host,
                                failures,
                                previous.age().num_seconds(),
                                e
                            ),
                            None => log::warn!(
                                "Poll via host '{}' failed ({} in a row), no snapshot available yet: {}",
                                self.host,
                                failures,
                                e
                            ),
                        }
                    }
                }
            }
        }
    }
}
