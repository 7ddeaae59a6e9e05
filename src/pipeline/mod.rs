//! Profile ingestion pipeline.
//!
//! A submitted profile URL flows through:
//! 1. `profile_url::validate_url()`: canonicalize or reject
//! 2. `ProfileExtractor::scrape()`: fetch the profile and its posts
//! 3. `ProductRules::derive_products()`: captions → products
//! 4. `IngestionPipeline::run()`: persist, notify, update the user

pub mod ingest;
pub mod products;
pub mod profile_url;

pub use ingest::{IngestionJob, IngestionOutcome, IngestionPipeline};
pub use products::ProductRules;
pub use profile_url::{ProfileUrl, candidate_token, validate_url};
