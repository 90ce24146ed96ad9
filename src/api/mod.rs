//! API layer - HTTP endpoints and middleware

pub mod admin;
pub mod gate;
pub mod health;
pub mod manage;
pub mod middleware;
pub mod router;
pub mod state;
pub mod types;
pub mod v1;

pub use gate::{GateRequest, GateResponse, Handled, RequestGate};
pub use middleware::RequireApiKey;
pub use router::{create_router, create_router_with_metrics};
pub use state::{AppState, Stores};
