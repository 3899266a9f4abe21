mod config;
mod snapshot;

pub use config::WatchConfig;
pub use snapshot::{PanelSnapshot, PlantSnapshot, Record};
