//! Backend HTTP service: routing and bootstrap

mod router;
mod server;

pub use router::{AppState, create_router};
pub use server::Server;
