pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

pub use error::{ApiError, ErrorBody};
pub use routes::create_router;
pub use state::AppState;
