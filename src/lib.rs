//! Notes storage and API gateway for the nextblog front end.
//!
//! This library stores short notes as JSON shards on disk, serves them over
//! an authenticated HTTP API and relays every other `/api` call to the blog
//! backend.

mod auth;
mod cli;
mod config;
mod errors;
mod helper;
mod note;
mod proxy;
mod routes;
mod server;
mod storage;
mod types;

// Re-export key components
pub use auth::*;
pub use cli::*;
pub use config::*;
pub use errors::*;
pub use helper::*;
pub use note::*;
pub use proxy::*;
pub use routes::*;
pub use server::*;
pub use storage::*;
pub use types::*;
