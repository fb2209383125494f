// fenix-core: Domain layer between fenix-api and consumers (entity hosts).

pub mod config;
pub mod coordinator;
pub mod error;
pub mod model;
pub mod normalize;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{ClientConfig, PollingConfig, DEFAULT_DISCOVERY_URL, MIN_POLL_INTERVAL};
pub use coordinator::Coordinator;
pub use error::CoreError;
pub use model::{
    AttrValue, Device, NormalizedState, Profile, SaunaSettings, SaunaStatus, Snapshot,
    TelemetrySample,
};

// Wire-level types hosts interact with directly: the client itself,
// the command surface, and the token-persistence contract.
pub use fenix_api::{
    CloudClient, DeviceCommand, DeviceCommandSink, TokenListener, TokenState,
};
