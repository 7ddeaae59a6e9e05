//! Catalogs (one per ingestion job) and the products derived for them.

pub mod model;

pub use model::{Catalog, CatalogStatus, Product};
