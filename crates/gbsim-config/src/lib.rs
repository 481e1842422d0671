pub mod loader;
pub mod settings;

pub use loader::{validate, ConfigLoader, CONFIG_FILE};
pub use settings::{FleetSection, MediaSection, ServerSection, SimulatorConfig, TimerSection};
