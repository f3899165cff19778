pub mod api;
pub mod config;
pub mod error;
pub mod estimation;
pub mod popularity;
pub mod sensor;
pub mod state;
pub mod store;
