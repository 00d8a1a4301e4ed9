//! Market data: provider interface, file-backed provider, CSV bar store.

pub mod csv_store;
pub mod provider;

pub use csv_store::CsvStore;
pub use provider::{validate_sequence, DataError, DataProvider, FileProvider};
