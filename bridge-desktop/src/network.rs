//! Network Monitoring Implementation

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    network::{NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType},
};
use core_async::time::{sleep, timeout, Duration};
use tracing::debug;

const DEFAULT_PROBE_ADDR: &str = "1.1.1.1:443";

/// Desktop network monitor implementation
///
/// Reachability is probed with a TCP connect; the connection type cannot be
/// distinguished without platform APIs, so connected hosts report
/// `NetworkType::Other` with no downlink estimate (classified `Fair`). Hosts
/// that know better should supply their own `NetworkMonitor`.
#[derive(Clone)]
pub struct DesktopNetworkMonitor {
    probe_addr: String,
    poll_interval: Duration,
}

impl DesktopNetworkMonitor {
    pub fn new() -> Self {
        Self {
            probe_addr: DEFAULT_PROBE_ADDR.to_string(),
            poll_interval: Duration::from_secs(5),
        }
    }

    pub fn with_probe(probe_addr: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            probe_addr: probe_addr.into(),
            poll_interval,
        }
    }

    async fn check_connectivity(&self) -> NetworkStatus {
        match timeout(
            Duration::from_secs(5),
            tokio::net::TcpStream::connect(self.probe_addr.as_str()),
        )
        .await
        {
            Ok(Ok(_)) => NetworkStatus::Connected,
            Ok(Err(_)) | Err(_) => NetworkStatus::Disconnected,
        }
    }
}

impl Default for DesktopNetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkMonitor for DesktopNetworkMonitor {
    async fn get_network_info(&self) -> Result<NetworkInfo> {
        let status = self.check_connectivity().await;

        let info = NetworkInfo {
            status,
            network_type: (status == NetworkStatus::Connected).then_some(NetworkType::Other),
            is_metered: false,
            downlink_mbps: None,
        };

        debug!(status = ?status, "Network info updated");
        Ok(info)
    }

    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>> {
        Ok(Box::new(DesktopNetworkChangeStream {
            monitor: self.clone(),
            last_info: None,
        }))
    }
}

/// Change stream that polls the probe and yields only on transitions
struct DesktopNetworkChangeStream {
    monitor: DesktopNetworkMonitor,
    last_info: Option<NetworkInfo>,
}

#[async_trait]
impl NetworkChangeStream for DesktopNetworkChangeStream {
    async fn next(&mut self) -> Option<NetworkInfo> {
        loop {
            if self.last_info.is_some() {
                sleep(self.monitor.poll_interval).await;
            }

            if let Ok(info) = self.monitor.get_network_info().await {
                if self.last_info.as_ref() != Some(&info) {
                    self.last_info = Some(info.clone());
                    return Some(info);
                }
            }
        }
    }
}
