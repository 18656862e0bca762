pub mod db;
pub mod mappings;
pub mod models;
pub mod observables;
pub mod rebuild_outbox;
pub mod schema;
pub mod tags;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;
