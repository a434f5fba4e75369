//! Network Monitoring Abstraction
//!
//! Provides connectivity status plus a coarse quality tier the cache uses to
//! pick download quality, cleanup cadence and preload aggressiveness.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Network connection type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkType {
    /// Cellular/mobile data connection
    Cellular,
    /// WiFi connection
    WiFi,
    /// Ethernet connection
    Ethernet,
    /// Other or unknown connection type
    Other,
}

/// Network connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Connected,
    Disconnected,
    /// Connection status unknown or indeterminate
    Indeterminate,
}

/// Network information
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkInfo {
    pub status: NetworkStatus,
    pub network_type: Option<NetworkType>,
    /// Whether the connection is metered (has data limits/costs)
    pub is_metered: bool,
    /// Estimated downlink bandwidth, when the platform reports one
    pub downlink_mbps: Option<f64>,
}

impl NetworkInfo {
    /// Info for a host with no connectivity.
    pub fn disconnected() -> Self {
        Self {
            status: NetworkStatus::Disconnected,
            network_type: None,
            is_metered: false,
            downlink_mbps: None,
        }
    }

    /// Coarse quality tier for this connection.
    pub fn quality(&self) -> NetworkQuality {
        NetworkQuality::classify(self)
    }
}

/// Coarse classification of current connectivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkQuality {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl NetworkQuality {
    /// Classify a connection.
    ///
    /// A reported downlink estimate wins over the connection type. Without one,
    /// wired and WiFi links count as `Good`, cellular and unknown links as
    /// `Fair`, and metered cellular is never better than `Fair`.
    pub fn classify(info: &NetworkInfo) -> Self {
        if info.status != NetworkStatus::Connected {
            return NetworkQuality::Poor;
        }

        let by_type = match info.network_type {
            Some(NetworkType::Ethernet) | Some(NetworkType::WiFi) => NetworkQuality::Good,
            Some(NetworkType::Cellular) | Some(NetworkType::Other) | None => NetworkQuality::Fair,
        };

        let tier = match info.downlink_mbps {
            Some(mbps) if mbps < 1.5 => NetworkQuality::Poor,
            Some(mbps) if mbps < 5.0 => NetworkQuality::Fair,
            Some(mbps) if mbps < 20.0 => NetworkQuality::Good,
            Some(_) => NetworkQuality::Excellent,
            None => by_type,
        };

        if info.is_metered && info.network_type == Some(NetworkType::Cellular) {
            tier.min(NetworkQuality::Fair)
        } else {
            tier
        }
    }

    pub fn is_poor(&self) -> bool {
        matches!(self, NetworkQuality::Poor)
    }
}

/// Network monitor trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::network::NetworkMonitor;
///
/// async fn current_tier(monitor: &dyn NetworkMonitor) -> NetworkQuality {
///     monitor
///         .get_network_info()
///         .await
///         .map(|info| info.quality())
///         .unwrap_or(NetworkQuality::Poor)
/// }
/// ```
#[async_trait::async_trait]
pub trait NetworkMonitor: Send + Sync {
    /// Get current network information
    async fn get_network_info(&self) -> Result<NetworkInfo>;

    /// Check if currently connected to any network
    async fn is_connected(&self) -> bool {
        matches!(
            self.get_network_info().await,
            Ok(NetworkInfo {
                status: NetworkStatus::Connected,
                ..
            })
        )
    }

    /// Subscribe to network status changes
    ///
    /// Implementations should emit an event whenever status, type or the
    /// quality tier changes.
    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>>;
}

/// Stream of network status changes
#[async_trait::async_trait]
pub trait NetworkChangeStream: Send {
    /// Get the next network info update
    ///
    /// Returns `None` when the stream is closed.
    async fn next(&mut self) -> Option<NetworkInfo>;
}
