//! apktriage Server
//!
//! HTTP surface over the apktriage ensemble. Uploaded packages are scanned
//! for permissions, paired with a device log snapshot, normalized, and
//! scored by all four model slots at once.

pub mod analysis;
pub mod config;
pub mod routes;
pub mod state;

pub use analysis::AnalysisResponse;
pub use config::{ConfigOverrides, ServerConfig};
pub use routes::create_router;
pub use state::AppState;
