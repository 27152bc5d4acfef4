pub mod handlers;
pub mod stats;

pub use handlers::dashboard_routes;
