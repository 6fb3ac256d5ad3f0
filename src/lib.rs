pub mod config;
pub mod context;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod retention;
pub mod usage;
pub mod ytdlp;

pub use context::AppContext;
pub use handlers::build_router;
