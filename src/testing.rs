//! Test doubles for the messaging, extraction and storage seams.
//!
//! Public so the integration tests under `tests/` can drive the full
//! service without network access.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::catalog::{Catalog, Product};
use crate::channels::{Messenger, OutboundPayload};
use crate::conversation::{ConversationState, User};
use crate::error::{ChannelError, DatabaseError, ExtractionError};
use crate::extractor::{Profile, ProfileExtractor};
use crate::store::Database;

// ── Messenger ───────────────────────────────────────────────────────

/// Records every send attempt. Optionally rejects them all.
#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<(String, OutboundPayload)>>,
    fail: bool,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// A messenger whose sends are recorded and then rejected.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, OutboundPayload)> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Text bodies sent to one recipient, oldest first.
    pub fn texts_to(&self, to: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(recipient, _)| recipient == to)
            .filter_map(|(_, payload)| match payload {
                OutboundPayload::Text { body } => Some(body),
                OutboundPayload::Template { .. } => None,
            })
            .collect()
    }

    /// Poll until `to` has received at least `count` texts or `wait` passes.
    pub async fn wait_for_texts(&self, to: &str, count: usize, wait: Duration) -> Vec<String> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let texts = self.texts_to(to);
            if texts.len() >= count || tokio::time::Instant::now() >= deadline {
                return texts;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, to: &str, payload: OutboundPayload) -> Result<(), ChannelError> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((to.to_string(), payload));
        if self.fail {
            return Err(ChannelError::Rejected {
                name: "recording".into(),
                status: 500,
            });
        }
        Ok(())
    }
}

// ── Extractor ───────────────────────────────────────────────────────

/// Returns a fixed profile (or error) for every URL.
pub struct StubExtractor {
    result: Result<Profile, ExtractionError>,
    calls: Mutex<Vec<String>>,
    gate: Option<Arc<Semaphore>>,
}

impl StubExtractor {
    pub fn with_profile(profile: Profile) -> Self {
        Self {
            result: Ok(profile),
            calls: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    pub fn failing(error: ExtractionError) -> Self {
        Self {
            result: Err(error),
            calls: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// Hold every scrape until `release` is called.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Let one held scrape through.
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }

    /// URLs requested so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl ProfileExtractor for StubExtractor {
    async fn scrape(&self, profile_url: &str) -> Result<Profile, ExtractionError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(profile_url.to_string());
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        self.result.clone()
    }
}

// ── Store ───────────────────────────────────────────────────────────

/// Delegates to a real store, failing the named operations.
pub struct FailingStore {
    inner: Arc<dyn Database>,
    failing: HashSet<&'static str>,
}

impl FailingStore {
    pub fn new(inner: Arc<dyn Database>) -> Self {
        Self {
            inner,
            failing: HashSet::new(),
        }
    }

    /// Fail every call to `operation` (a `Database` method name).
    pub fn fail_on(mut self, operation: &'static str) -> Self {
        self.failing.insert(operation);
        self
    }

    fn check(&self, operation: &str) -> Result<(), DatabaseError> {
        if self.failing.contains(operation) {
            return Err(DatabaseError::Query(format!("{operation}: injected failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl Database for FailingStore {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        self.check("run_migrations")?;
        self.inner.run_migrations().await
    }

    async fn get_user_by_phone(&self, phone_number: &str) -> Result<Option<User>, DatabaseError> {
        self.check("get_user_by_phone")?;
        self.inner.get_user_by_phone(phone_number).await
    }

    async fn insert_user_if_absent(&self, user: &User) -> Result<bool, DatabaseError> {
        self.check("insert_user_if_absent")?;
        self.inner.insert_user_if_absent(user).await
    }

    async fn update_user_state(
        &self,
        user_id: Uuid,
        state: &ConversationState,
    ) -> Result<(), DatabaseError> {
        self.check("update_user_state")?;
        self.inner.update_user_state(user_id, state).await
    }

    async fn insert_catalog(&self, catalog: &Catalog) -> Result<(), DatabaseError> {
        self.check("insert_catalog")?;
        self.inner.insert_catalog(catalog).await
    }

    async fn get_catalog(&self, id: Uuid) -> Result<Option<Catalog>, DatabaseError> {
        self.check("get_catalog")?;
        self.inner.get_catalog(id).await
    }

    async fn list_catalogs_for_user(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Catalog>, DatabaseError> {
        self.check("list_catalogs_for_user")?;
        self.inner.list_catalogs_for_user(user_id, limit).await
    }

    async fn mark_catalog_failed(&self, id: Uuid) -> Result<(), DatabaseError> {
        self.check("mark_catalog_failed")?;
        self.inner.mark_catalog_failed(id).await
    }

    async fn complete_catalog(
        &self,
        id: Uuid,
        product_count: u32,
        business_name: &str,
    ) -> Result<(), DatabaseError> {
        self.check("complete_catalog")?;
        self.inner.complete_catalog(id, product_count, business_name).await
    }

    async fn insert_products(&self, products: &[Product]) -> Result<usize, DatabaseError> {
        self.check("insert_products")?;
        self.inner.insert_products(products).await
    }

    async fn list_products(&self, catalog_id: Uuid) -> Result<Vec<Product>, DatabaseError> {
        self.check("list_products")?;
        self.inner.list_products(catalog_id).await
    }
}
