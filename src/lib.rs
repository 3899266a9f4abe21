pub mod comm;
pub mod common;
pub mod data;
pub mod document;
pub mod model;
pub mod scheduler;
pub mod watcher;
