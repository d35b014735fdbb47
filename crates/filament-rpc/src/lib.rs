pub mod server;
pub mod types;

pub use server::router;
pub use types::{ErrorDetail, Response};
