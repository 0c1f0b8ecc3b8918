pub mod actions;
pub mod cipher;
pub mod client;
pub mod commands;
pub mod config;
pub mod constants;
pub mod descriptor;
pub mod discovery;
pub mod envelope;
pub mod error;
pub mod framing;
pub mod markup;
pub mod proxy;
pub mod relay;
pub mod result;
pub mod schedule;
pub mod tunnel;

// Re-export the entry points for easy access
pub use actions::{Action, ActionOptions};
pub use client::DeviceClient;
pub use config::ClientConfig;
pub use descriptor::DeviceDescriptor;
pub use discovery::DiscoveryClient;
pub use error::Error;
pub use result::DeviceResult;
