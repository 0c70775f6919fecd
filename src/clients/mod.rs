pub mod backend_client;

pub use backend_client::{BackendApi, BackendClient};
