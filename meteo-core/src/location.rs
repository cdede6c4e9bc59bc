//! Device location: one-shot acquisition and change subscriptions.

use async_trait::async_trait;
use std::{convert::TryFrom, fmt::Debug, sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;

use crate::error::LocationError;
use crate::model::{AddressParts, Coordinates};

pub mod host;

pub use host::HostPlatform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocationSource {
    /// Approximate position from the public IP address.
    Ip,
    /// Position pinned in configuration.
    Fixed,
    /// Location access refused.
    Off,
}

impl LocationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationSource::Ip => "ip",
            LocationSource::Fixed => "fixed",
            LocationSource::Off => "off",
        }
    }

    pub const fn all() -> &'static [LocationSource] {
        &[LocationSource::Ip, LocationSource::Fixed, LocationSource::Off]
    }
}

impl std::fmt::Display for LocationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for LocationSource {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "ip" => Ok(LocationSource::Ip),
            "fixed" => Ok(LocationSource::Fixed),
            "off" => Ok(LocationSource::Off),
            _ => Err(anyhow::anyhow!(
                "Unknown location source '{value}'. Supported sources: ip, fixed, off."
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Accuracy {
    Low,
    Balanced,
    #[default]
    High,
}

/// Platform location services.
#[async_trait]
pub trait LocationPlatform: Send + Sync + Debug {
    async fn request_permission(&self) -> PermissionStatus;

    async fn services_enabled(&self) -> bool;

    /// Ask the user to turn location services on. Does not wait for the answer.
    async fn prompt_enable_services(&self);

    async fn current_position(&self, accuracy: Accuracy) -> Result<Coordinates, LocationError>;

    /// Candidate addresses for `coords`, best first.
    async fn reverse_geocode(&self, coords: Coordinates) -> Result<Vec<AddressParts>, LocationError>;
}

/// Thresholds for forwarding position changes to a subscriber.
///
/// The platform is read every `sample_every`; a fix goes through once it has
/// moved `min_distance_m` or `min_interval` has passed, whichever comes first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchOptions {
    pub accuracy: Accuracy,
    pub sample_every: Duration,
    pub min_interval: Duration,
    pub min_distance_m: f64,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            accuracy: Accuracy::High,
            sample_every: Duration::from_secs(1),
            min_interval: Duration::from_secs(5),
            min_distance_m: 10.0,
        }
    }
}

impl WatchOptions {
    /// Whether a new fix should reach the subscriber, given the last forwarded one.
    /// Either threshold is enough.
    pub fn admits(&self, last: Option<(Instant, Coordinates)>, now: Instant, fix: Coordinates) -> bool {
        match last {
            None => true,
            Some((at, prev)) => {
                now.duration_since(at) >= self.min_interval || prev.distance_m(&fix) >= self.min_distance_m
            }
        }
    }
}

/// Handle to a running position watcher. Dropping it stops the watcher.
#[derive(Debug)]
pub struct Subscription {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the watcher and wait until it has exited.
    pub async fn release(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("location watcher ended abnormally: {e}");
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[derive(Debug, Clone)]
pub struct LocationTracker {
    platform: Arc<dyn LocationPlatform>,
    accuracy: Accuracy,
    watch: WatchOptions,
}

impl LocationTracker {
    pub fn new(platform: Arc<dyn LocationPlatform>) -> Self {
        Self {
            platform,
            accuracy: Accuracy::High,
            watch: WatchOptions::default(),
        }
    }

    pub fn with_accuracy(mut self, accuracy: Accuracy) -> Self {
        self.accuracy = accuracy;
        self
    }

    pub fn with_watch_options(mut self, watch: WatchOptions) -> Self {
        self.watch = watch;
        self
    }

    pub fn platform(&self) -> &Arc<dyn LocationPlatform> {
        &self.platform
    }

    /// Best-effort current position.
    ///
    /// `Ok(None)` when permission is denied or location services are off (the
    /// user is prompted in the latter case); callers fall back to a default.
    pub async fn acquire_once(&self) -> Result<Option<Coordinates>, LocationError> {
        if self.platform.request_permission().await == PermissionStatus::Denied {
            tracing::info!("location permission denied");
            return Ok(None);
        }

        if !self.platform.services_enabled().await {
            self.platform.prompt_enable_services().await;
            return Ok(None);
        }

        let coords = self.platform.current_position(self.accuracy).await?;
        tracing::debug!(%coords, "acquired position");
        Ok(Some(coords))
    }

    /// Watch for position changes until the returned handle is released or dropped.
    ///
    /// `None` when permission is denied.
    pub async fn subscribe<F>(&self, on_change: F) -> Option<Subscription>
    where
        F: Fn(Coordinates) + Send + Sync + 'static,
    {
        if self.platform.request_permission().await == PermissionStatus::Denied {
            tracing::info!("location permission denied; not watching position");
            return None;
        }

        let cancel = CancellationToken::new();
        let platform = Arc::clone(&self.platform);
        let options = self.watch;
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(options.sample_every.min(options.min_interval));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut last: Option<(Instant, Coordinates)> = None;

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let fix = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    fix = platform.current_position(options.accuracy) => fix,
                };

                match fix {
                    Ok(coords) => {
                        let now = Instant::now();
                        if options.admits(last, now, coords) {
                            last = Some((now, coords));
                            on_change(coords);
                        }
                    }
                    Err(e) => tracing::debug!("position sample failed: {e}"),
                }
            }

            tracing::debug!("location watcher stopped");
        });

        Some(Subscription { cancel, task: Some(task) })
    }
}
