pub mod actor;
pub mod handlers;
pub mod routes;

pub use actor::Actor;
pub use handlers::{AppState, SharedState};
pub use routes::create_router;
