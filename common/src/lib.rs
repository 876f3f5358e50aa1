pub mod error;
pub mod models;
pub mod valuation;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
