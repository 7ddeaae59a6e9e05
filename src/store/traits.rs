//! `Database` trait: the single async interface for persistence.
//!
//! Constructed once at startup and shared as `Arc<dyn Database>` by the
//! dispatcher, the ingestion pipeline and the HTTP routes.

use async_trait::async_trait;
use uuid::Uuid;

use crate::catalog::{Catalog, Product};
use crate::conversation::{ConversationState, User};
use crate::error::DatabaseError;

/// Backend-agnostic database trait covering users, catalogs and products.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Users ───────────────────────────────────────────────────────

    /// Look up a user by phone number.
    async fn get_user_by_phone(&self, phone_number: &str) -> Result<Option<User>, DatabaseError>;

    /// Insert a user unless one already exists for its phone number.
    /// Returns `true` if this call created the row.
    async fn insert_user_if_absent(&self, user: &User) -> Result<bool, DatabaseError>;

    /// Overwrite a user's conversation state and bump `updated_at`.
    async fn update_user_state(
        &self,
        user_id: Uuid,
        state: &ConversationState,
    ) -> Result<(), DatabaseError>;

    // ── Catalogs ────────────────────────────────────────────────────

    /// Insert a new catalog.
    async fn insert_catalog(&self, catalog: &Catalog) -> Result<(), DatabaseError>;

    /// Get a catalog by ID.
    async fn get_catalog(&self, id: Uuid) -> Result<Option<Catalog>, DatabaseError>;

    /// Catalogs owned by a user, most recent first.
    async fn list_catalogs_for_user(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Catalog>, DatabaseError>;

    /// Mark a catalog `failed` and stamp `completed_at`.
    async fn mark_catalog_failed(&self, id: Uuid) -> Result<(), DatabaseError>;

    /// Mark a catalog `completed` with its summary and stamp `completed_at`.
    async fn complete_catalog(
        &self,
        id: Uuid,
        product_count: u32,
        business_name: &str,
    ) -> Result<(), DatabaseError>;

    // ── Products ────────────────────────────────────────────────────

    /// Insert all products in one statement. Returns the number inserted.
    async fn insert_products(&self, products: &[Product]) -> Result<usize, DatabaseError>;

    /// Products of one catalog, in insertion order.
    async fn list_products(&self, catalog_id: Uuid) -> Result<Vec<Product>, DatabaseError>;
}
