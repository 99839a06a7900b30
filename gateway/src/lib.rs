pub mod config;
pub mod core;

// Re-export commonly used items for convenience
pub use config::{GatewayConfig, TransportTarget};
pub use self::core::*;
