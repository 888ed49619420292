pub mod builder;
pub mod handler;
pub mod listener;
pub mod router;

pub use builder::ServerBuilder;
pub use handler::{RequestHandler, HTTP_SOURCE};
pub use router::{RouteError, Router};
