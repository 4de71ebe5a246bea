//! Infrastructure layer: storage ports and adapters, plus the application
//! services that orchestrate the catalog, cart and order domain crates.

pub mod error;
pub mod services;
pub mod store;
pub mod workers;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{CommerceError, LedgerError, StoreError};
