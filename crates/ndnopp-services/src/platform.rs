//! Wi-Fi P2P platform adapter — the commands the peer tracker issues.
//! Platform events flow the other way, through the daemon's boundary methods.

use ndnopp_core::PlatformError;

pub trait P2pPlatform: Send + Sync {
    /// Start delivering P2P state and peer-list events.
    fn register_receiver(&self) -> Result<(), PlatformError>;
    fn unregister_receiver(&self) -> Result<(), PlatformError>;

    /// Register a DNS-SD service request on the P2P channel.
    fn add_service_request(&self) -> Result<(), PlatformError>;
    fn discover_services(&self) -> Result<(), PlatformError>;
    fn clear_service_requests(&self) -> Result<(), PlatformError>;
}
