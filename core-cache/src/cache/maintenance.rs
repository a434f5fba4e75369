//! Background maintenance tasks
//!
//! Four loops run while the manager is started: idle cleanup plus preload,
//! memory pressure checks, network change handling and the viewing pattern
//! flush. Each holds only a weak handle to the manager and exits when the
//! shutdown signal fires or the manager is dropped.

use crate::cache::manager::{MediaCacheManager, WeakManager};
use bridge_traits::network::NetworkMonitor;
use core_async::sync::watch;
use core_async::task::JoinHandle;
use core_async::time::{interval, sleep, Duration, MissedTickBehavior};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub(crate) fn spawn(manager: &MediaCacheManager) -> Vec<JoinHandle<()>> {
    let config = manager.config();
    vec![
        core_async::spawn(idle_cleanup_loop(
            manager.downgrade(),
            manager.shutdown_signal(),
        )),
        core_async::spawn(memory_pressure_loop(
            manager.downgrade(),
            manager.shutdown_signal(),
            config.memory_check_interval,
        )),
        core_async::spawn(network_loop(
            manager.downgrade(),
            manager.network_monitor(),
            manager.shutdown_signal(),
        )),
        core_async::spawn(pattern_flush_loop(
            manager.downgrade(),
            manager.shutdown_signal(),
            config.pattern_flush_interval,
        )),
    ]
}

async fn idle_cleanup_loop(manager: WeakManager, mut shutdown: watch::Receiver<bool>) {
    loop {
        let period = match manager.upgrade() {
            Some(cache) => cache.idle_cleanup_period().await,
            None => break,
        };

        core_async::select! {
            _ = sleep(period) => {}
            _ = shutdown.changed() => break,
        }

        let Some(cache) = manager.upgrade() else { break };
        let removed = cache.cleanup_idle().await;
        let warmed = cache.preload().await;
        debug!(removed, warmed, "Idle maintenance pass");
    }
    debug!("Idle cleanup task stopped");
}

async fn memory_pressure_loop(
    manager: WeakManager,
    mut shutdown: watch::Receiver<bool>,
    period: Duration,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        core_async::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }

        let Some(cache) = manager.upgrade() else { break };
        if let Some(report) = cache.relieve_memory_pressure().await {
            debug!(
                entries = report.entries_evicted,
                bytes_freed = report.bytes_freed,
                "Memory pressure pass"
            );
        }
    }
    debug!("Memory pressure task stopped");
}

async fn network_loop(
    manager: WeakManager,
    monitor: Arc<dyn NetworkMonitor>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut changes = match monitor.subscribe_changes().await {
        Ok(changes) => changes,
        Err(e) => {
            warn!(error = %e, "Network change notifications unavailable");
            return;
        }
    };

    loop {
        core_async::select! {
            next = changes.next() => match next {
                Some(info) => {
                    let Some(cache) = manager.upgrade() else { break };
                    if cache.apply_network_info(&info).await {
                        info!(quality = ?info.quality(), "Network quality changed");
                    }
                }
                None => {
                    debug!("Network change stream ended");
                    break;
                }
            },
            _ = shutdown.changed() => break,
        }
    }
    debug!("Network task stopped");
}

async fn pattern_flush_loop(
    manager: WeakManager,
    mut shutdown: watch::Receiver<bool>,
    period: Duration,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        core_async::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }

        let Some(cache) = manager.upgrade() else { break };
        if let Err(e) = cache.flush_patterns().await {
            warn!(error = %e, "Failed to persist viewing patterns");
        }
    }
    debug!("Pattern flush task stopped");
}
