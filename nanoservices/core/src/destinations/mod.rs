pub mod bigquery;
pub mod file;
pub mod traits;

pub use bigquery::{BigQueryDestination, ServiceAccountTokens, StaticToken, TokenSource};
pub use file::FileDestination;
pub use traits::{Destination, LoadReport};
