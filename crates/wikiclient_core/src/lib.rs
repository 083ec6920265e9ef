pub mod category;
pub mod clock;
pub mod config;
pub mod continuation;
pub mod edit;
pub mod error;
pub mod file;
pub mod markup;
pub mod namespace;
pub mod page;
pub mod params;
pub mod response;
pub mod retry;
pub mod session;
pub mod site;
pub mod throttle;
pub mod tokens;
pub mod transport;
pub mod user;

#[cfg(test)]
mod testing;

pub use error::{Result, WikiError};
pub use session::{AuthState, QueryOptions, Session};
