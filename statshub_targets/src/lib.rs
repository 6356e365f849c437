pub mod common;
pub mod orders;

pub use common::{shutdown_signal, HealthStatus};
pub use orders::{app, AppState};
