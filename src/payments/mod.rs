pub mod error;
pub mod gateway;
pub mod models;
pub mod repository;
pub mod service;
pub mod status_machine;
pub mod webhook;

pub use error::*;
pub use gateway::*;
pub use models::*;
pub use repository::*;
pub use service::*;
pub use status_machine::*;
pub use webhook::*;
