pub mod api;
pub mod config;
pub mod error;
pub mod geo;
pub mod location;
pub mod measurement;
pub mod regions;
pub mod registry;
pub mod state;
pub mod store;
pub mod transfer;

pub use api::{SharedState, create_router, shared_state};
pub use error::MapperError;
pub use state::AppState;
