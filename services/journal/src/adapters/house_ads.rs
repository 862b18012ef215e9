//! services/journal/src/adapters/house_ads.rs
//!
//! A self-hosted ad network: serves the app's own promotional creatives so the
//! ad gates work without a third-party mediation SDK. A presentation "runs"
//! for a fixed display time and rewarded units always grant their reward on
//! completion.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use for_me_core::{
    domain::AdSurface,
    ports::{AdNetwork, LoadedAd, PortError, PortResult, PresentationEnd, PresentationHost},
};
use tracing::info;

pub struct HouseAdNetwork {
    load_latency: Duration,
    display_time: Duration,
    served: AtomicUsize,
}

impl HouseAdNetwork {
    pub fn new(load_latency: Duration, display_time: Duration) -> Self {
        Self { load_latency, display_time, served: AtomicUsize::new(0) }
    }
}

impl Default for HouseAdNetwork {
    fn default() -> Self {
        Self::new(Duration::from_millis(200), Duration::from_secs(2))
    }
}

#[async_trait]
impl AdNetwork for HouseAdNetwork {
    async fn load(&self, surface: AdSurface, unit_id: &str) -> PortResult<LoadedAd> {
        if unit_id.trim().is_empty() {
            return Err(PortError::Invalid(format!("no unit id configured for the {} ad", surface)));
        }
        tokio::time::sleep(self.load_latency).await;
        let n = self.served.fetch_add(1, Ordering::Relaxed);
        Ok(LoadedAd {
            surface,
            unit_id: unit_id.to_string(),
            handle: format!("house-{}-{}", surface, n),
        })
    }

    async fn present(&self, ad: LoadedAd) -> PortResult<PresentationEnd> {
        info!("Presenting house ad {} on unit {}", ad.handle, ad.unit_id);
        tokio::time::sleep(self.display_time).await;
        Ok(match ad.surface {
            AdSurface::Rewarded => PresentationEnd::RewardEarned,
            AdSurface::Banner | AdSurface::Interstitial => PresentationEnd::Dismissed,
        })
    }
}

/// Presentation host for a server without a view hierarchy; never mid-transition.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessHost;

impl PresentationHost for HeadlessHost {
    fn is_transitioning(&self) -> bool {
        false
    }
}
