pub mod handlers;
pub mod history;
pub mod jobs;
pub mod middleware;
pub mod routes;
pub mod settings;
pub mod uploads;
pub mod ws;

pub use routes::create_router;
