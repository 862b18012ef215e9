//! crates/for_me_core/src/ads.rs
//!
//! The Ad Gate: readiness tracking and the load/show protocol for the banner,
//! interstitial and rewarded surfaces. Other components consult it before
//! gated actions; granting rewards is the caller's job.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::AdSurface;
use crate::ports::{AdNetwork, LoadedAd, PortResult, PresentationEnd, PresentationHost};

/// Unit identifiers supplied by configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdUnits {
    pub banner: String,
    pub interstitial: String,
    pub rewarded: String,
}

impl AdUnits {
    pub fn unit_for(&self, surface: AdSurface) -> &str {
        match surface {
            AdSurface::Banner => &self.banner,
            AdSurface::Interstitial => &self.interstitial,
            AdSurface::Rewarded => &self.rewarded,
        }
    }
}

/// Fixed backoff before a failed load is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub banner: Duration,
    pub full_screen: Duration,
}

impl RetryPolicy {
    pub fn delay_for(&self, surface: AdSurface) -> Duration {
        if surface.is_full_screen() {
            self.full_screen
        } else {
            self.banner
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { banner: Duration::from_secs(30), full_screen: Duration::from_secs(5) }
    }
}

/// Result of asking for a rewarded presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardOutcome {
    /// Presented to completion; exactly one reward is owed.
    Earned,
    /// Not ready, or the host could not present right now.
    NotShown,
    /// Presented but failed or was closed without earning the reward.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdReadiness {
    pub banner: bool,
    pub interstitial: bool,
    pub rewarded: bool,
}

#[derive(Default)]
struct SurfaceState {
    loaded: Option<LoadedAd>,
    retrying: bool,
}

pub struct AdGate {
    network: Arc<dyn AdNetwork>,
    host: Arc<dyn PresentationHost>,
    units: AdUnits,
    retry: RetryPolicy,
    surfaces: Mutex<HashMap<AdSurface, SurfaceState>>,
    shutdown: CancellationToken,
}

impl AdGate {
    pub fn new(
        network: Arc<dyn AdNetwork>,
        host: Arc<dyn PresentationHost>,
        units: AdUnits,
        retry: RetryPolicy,
    ) -> Arc<Self> {
        Arc::new(Self {
            network,
            host,
            units,
            retry,
            surfaces: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        })
    }

    pub async fn is_ready(&self, surface: AdSurface) -> bool {
        self.surfaces
            .lock()
            .await
            .get(&surface)
            .is_some_and(|state| state.loaded.is_some())
    }

    pub async fn readiness(&self) -> AdReadiness {
        AdReadiness {
            banner: self.is_ready(AdSurface::Banner).await,
            interstitial: self.is_ready(AdSurface::Interstitial).await,
            rewarded: self.is_ready(AdSurface::Rewarded).await,
        }
    }

    pub async fn preload_all(self: &Arc<Self>) {
        for surface in AdSurface::ALL {
            // Failures are already logged and retried by `load`.
            let _ = self.load(surface).await;
        }
    }

    /// Loads the surface once. On failure a retry is scheduled after the
    /// surface's backoff and the error is returned to the caller.
    pub async fn load(self: &Arc<Self>, surface: AdSurface) -> PortResult<()> {
        if self.is_ready(surface).await {
            return Ok(());
        }
        match self.try_load(surface).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.schedule_retry(surface).await;
                Err(e)
            }
        }
    }

    /// Shows an ad. Returns `false` when nothing is loaded or the host is
    /// mid-transition; nothing is queued in that case.
    ///
    /// The banner is a persistent view, so showing it only reports readiness.
    /// Full-screen surfaces resolve after dismissal and are reloaded for next use.
    pub async fn show(self: &Arc<Self>, surface: AdSurface) -> bool {
        if !surface.is_full_screen() {
            return self.is_ready(surface).await;
        }
        match self.present_full_screen(surface).await {
            Some(Ok(_)) => true,
            Some(Err(_)) | None => false,
        }
    }

    pub async fn show_rewarded(self: &Arc<Self>) -> RewardOutcome {
        match self.present_full_screen(AdSurface::Rewarded).await {
            Some(Ok(PresentationEnd::RewardEarned)) => RewardOutcome::Earned,
            Some(Ok(PresentationEnd::Dismissed)) | Some(Err(_)) => RewardOutcome::Failed,
            None => RewardOutcome::NotShown,
        }
    }

    /// Stops every pending retry timer.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn present_full_screen(
        self: &Arc<Self>,
        surface: AdSurface,
    ) -> Option<PortResult<PresentationEnd>> {
        let ad = {
            let mut surfaces = self.surfaces.lock().await;
            let state = surfaces.entry(surface).or_default();
            if state.loaded.is_none() {
                debug!("{} ad not ready", surface);
                return None;
            }
            if self.host.is_transitioning() {
                info!("Host is mid-transition; not presenting {} ad", surface);
                return None;
            }
            state.loaded.take()?
        };

        let result = self.network.present(ad).await;
        if let Err(e) = &result {
            warn!("Failed to present {} ad: {}", surface, e);
        }
        self.reload_in_background(surface);
        Some(result)
    }

    async fn try_load(&self, surface: AdSurface) -> PortResult<()> {
        let ad = match self.network.load(surface, self.units.unit_for(surface)).await {
            Ok(ad) => ad,
            Err(e) => {
                warn!("Failed to load {} ad: {}", surface, e);
                return Err(e);
            }
        };
        self.surfaces.lock().await.entry(surface).or_default().loaded = Some(ad);
        info!("{} ad ready", surface);
        Ok(())
    }

    fn reload_in_background(self: &Arc<Self>, surface: AdSurface) {
        let gate = Arc::clone(self);
        tokio::spawn(async move {
            if gate.try_load(surface).await.is_err() {
                gate.schedule_retry(surface).await;
            }
        });
    }

    async fn schedule_retry(self: &Arc<Self>, surface: AdSurface) {
        {
            let mut surfaces = self.surfaces.lock().await;
            let state = surfaces.entry(surface).or_default();
            if state.retrying {
                return;
            }
            state.retrying = true;
        }

        let gate = Arc::clone(self);
        let delay = self.retry.delay_for(surface);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = gate.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
                if gate.try_load(surface).await.is_ok() {
                    break;
                }
            }
            if let Some(state) = gate.surfaces.lock().await.get_mut(&surface) {
                state.retrying = false;
            }
        });
    }
}
