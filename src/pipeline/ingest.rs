//! Ingestion pipeline: profile URL in, persisted catalog out.
//!
//! Runs as a background job after the dispatcher has moved the user to
//! `processing`. Every terminal path notifies the user; failures never
//! propagate out of `run`.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::channels::{ErrorReply, Messenger, replies};
use crate::conversation::Step;
use crate::extractor::ProfileExtractor;
use crate::pipeline::products::{ProductRules, business_name};
use crate::store::Database;
use crate::worker::{JobGuard, UserLocks};

/// One accepted profile URL for one user.
#[derive(Debug, Clone)]
pub struct IngestionJob {
    pub user_id: Uuid,
    pub phone_number: String,
    /// Canonical profile URL.
    pub profile_url: String,
}

/// Where a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestionOutcome {
    Completed {
        catalog_id: Uuid,
        product_count: usize,
        business_name: String,
    },
    ScrapeFailed {
        catalog_id: Uuid,
    },
    NoProducts {
        catalog_id: Uuid,
    },
    /// A store write failed; `catalog_id` is set once the catalog exists.
    PersistFailed {
        catalog_id: Option<Uuid>,
        stage: &'static str,
    },
}

impl IngestionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Collaborators and policy for ingestion runs.
pub struct IngestionPipeline {
    store: Arc<dyn Database>,
    messenger: Arc<dyn Messenger>,
    extractor: Arc<dyn ProfileExtractor>,
    locks: Arc<UserLocks>,
    rules: ProductRules,
    /// Move the user back to `waiting_for_url` when a run does not complete.
    reset_on_failure: bool,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn Database>,
        messenger: Arc<dyn Messenger>,
        extractor: Arc<dyn ProfileExtractor>,
        locks: Arc<UserLocks>,
        rules: ProductRules,
        reset_on_failure: bool,
    ) -> Self {
        Self {
            store,
            messenger,
            extractor,
            locks,
            rules,
            reset_on_failure,
        }
    }

    /// Run one job to a terminal outcome.
    pub async fn run(&self, job: IngestionJob) -> IngestionOutcome {
        self.run_inner(job, None).await
    }

    /// Run a job that holds the user's ingestion slot. The slot is released
    /// together with the final user write.
    pub async fn run_exclusive(&self, job: IngestionJob, slot: JobGuard) -> IngestionOutcome {
        self.run_inner(job, Some(slot)).await
    }

    #[instrument(skip_all, fields(user_id = %job.user_id, url = %job.profile_url))]
    async fn run_inner(&self, job: IngestionJob, slot: Option<JobGuard>) -> IngestionOutcome {
        let outcome = self.execute(&job).await;

        // Messages for this user are handled under the same lock, so none
        // sees the slot freed without the final state.
        let _guard = self.locks.lock(&job.phone_number).await;
        drop(slot);
        match &outcome {
            IngestionOutcome::Completed { catalog_id, .. } => {
                self.record_completion(&job, *catalog_id).await;
            }
            _ => self.settle_failed_user(&job).await,
        }
        outcome
    }

    async fn execute(&self, job: &IngestionJob) -> IngestionOutcome {
        // 1. Catalog record
        let catalog = Catalog::new(job.user_id, job.profile_url.as_str());
        if let Err(e) = self.store.insert_catalog(&catalog).await {
            error!(error = %e, "Failed to create catalog");
            self.notify(job, ErrorReply::General.text()).await;
            return IngestionOutcome::PersistFailed {
                catalog_id: None,
                stage: "insert_catalog",
            };
        }

        // 2. Extraction
        let profile = match self.extractor.scrape(&job.profile_url).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(catalog_id = %catalog.id, error = %e, "Failed to scrape profile");
                self.fail_catalog(catalog.id).await;
                self.notify(job, ErrorReply::ScrapingFailed.text()).await;
                return IngestionOutcome::ScrapeFailed {
                    catalog_id: catalog.id,
                };
            }
        };

        // 3. Products
        let products = self.rules.derive_products(&profile, job.user_id, catalog.id);

        // 4. Nothing usable; the catalog stays `processing`.
        if products.is_empty() {
            warn!(
                catalog_id = %catalog.id,
                posts = profile.posts.len(),
                "No products found in profile"
            );
            self.notify(job, ErrorReply::NoProducts.text()).await;
            return IngestionOutcome::NoProducts {
                catalog_id: catalog.id,
            };
        }

        // 5. Persist products
        if let Err(e) = self.store.insert_products(&products).await {
            error!(catalog_id = %catalog.id, error = %e, "Failed to save products");
            self.fail_catalog(catalog.id).await;
            self.notify(job, ErrorReply::General.text()).await;
            return IngestionOutcome::PersistFailed {
                catalog_id: Some(catalog.id),
                stage: "insert_products",
            };
        }

        // 6. Close out the catalog
        let name = business_name(&profile);
        let count = products.len();
        let stored_count = u32::try_from(count).unwrap_or(u32::MAX);
        if let Err(e) = self.store.complete_catalog(catalog.id, stored_count, &name).await {
            error!(catalog_id = %catalog.id, error = %e, "Failed to complete catalog");
            self.fail_catalog(catalog.id).await;
            self.notify(job, ErrorReply::General.text()).await;
            return IngestionOutcome::PersistFailed {
                catalog_id: Some(catalog.id),
                stage: "complete_catalog",
            };
        }

        // 7. Tell the user; step 8 runs in `run_inner` under the user lock.
        self.notify(job, replies::catalog_complete(&name, count)).await;

        info!(
            catalog_id = %catalog.id,
            product_count = count,
            business_name = %name,
            "Catalog created successfully"
        );

        IngestionOutcome::Completed {
            catalog_id: catalog.id,
            product_count: count,
            business_name: name,
        }
    }

    async fn notify(&self, job: &IngestionJob, text: String) {
        if let Err(e) = self.messenger.send_text(&job.phone_number, &text).await {
            warn!(phone = %job.phone_number, error = %e, "Failed to notify user");
        }
    }

    async fn fail_catalog(&self, catalog_id: Uuid) {
        if let Err(e) = self.store.mark_catalog_failed(catalog_id).await {
            error!(catalog_id = %catalog_id, error = %e, "Failed to mark catalog failed");
        }
    }

    /// 8. Record the active catalog on a fresh copy of the user. Caller
    /// holds the user lock.
    async fn record_completion(&self, job: &IngestionJob, catalog_id: Uuid) {
        match self.store.get_user_by_phone(&job.phone_number).await {
            Ok(Some(mut user)) => {
                user.state.complete(&catalog_id.to_string());
                if let Err(e) = self.store.update_user_state(user.id, &user.state).await {
                    error!(error = %e, "Failed to update user after catalog completion");
                }
            }
            Ok(None) => warn!(phone = %job.phone_number, "User vanished before completion"),
            Err(e) => error!(error = %e, "Failed to reload user after catalog completion"),
        }
    }

    /// Return a still-processing user to `waiting_for_url` so their next
    /// message is read as a new URL. Disabled by configuration, the user
    /// stays in `processing` until they greet again. Caller holds the user
    /// lock.
    async fn settle_failed_user(&self, job: &IngestionJob) {
        if !self.reset_on_failure {
            return;
        }

        let user = match self.store.get_user_by_phone(&job.phone_number).await {
            Ok(Some(user)) => user,
            Ok(None) => return,
            Err(e) => {
                error!(error = %e, "Failed to reload user after ingestion failure");
                return;
            }
        };

        // Anything else means the user has moved on since the job started.
        if user.state.step != Step::Processing {
            return;
        }

        let mut state = user.state;
        state.await_retry();
        if let Err(e) = self.store.update_user_state(user.id, &state).await {
            error!(error = %e, "Failed to reset user after ingestion failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::catalog::CatalogStatus;
    use crate::conversation::{User, resolve_user};
    use crate::error::ExtractionError;
    use crate::extractor::{Post, Profile};
    use crate::store::LibSqlBackend;
    use crate::testing::{FailingStore, RecordingMessenger, StubExtractor};
    use crate::worker::ActiveJobs;

    const PHONE: &str = "15550001111";
    const URL: &str = "https://www.instagram.com/shop_x/";

    fn profile(captions: &[&str]) -> Profile {
        Profile {
            username: "shop_x".into(),
            display_name: "Shop X".into(),
            bio: String::new(),
            posts: captions
                .iter()
                .map(|c| Post {
                    caption: c.to_string(),
                    post_url: format!("{URL}p/{}/", c.len()),
                    ..Default::default()
                })
                .collect(),
        }
    }

    struct Harness {
        store: Arc<dyn Database>,
        messenger: Arc<RecordingMessenger>,
        user: User,
    }

    impl Harness {
        async fn new() -> Self {
            let store: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
            let user = resolve_user(store.as_ref(), PHONE, None).await.unwrap();
            let mut state = user.state.clone();
            state.start_processing(URL);
            store.update_user_state(user.id, &state).await.unwrap();
            Self {
                store,
                messenger: Arc::new(RecordingMessenger::new()),
                user,
            }
        }

        fn pipeline(&self, extractor: StubExtractor, reset: bool) -> IngestionPipeline {
            self.pipeline_with_store(Arc::clone(&self.store), extractor, reset)
        }

        fn pipeline_with_store(
            &self,
            store: Arc<dyn Database>,
            extractor: StubExtractor,
            reset: bool,
        ) -> IngestionPipeline {
            IngestionPipeline::new(
                store,
                self.messenger.clone(),
                Arc::new(extractor),
                Arc::new(UserLocks::new()),
                ProductRules::new().unwrap(),
                reset,
            )
        }

        fn job(&self) -> IngestionJob {
            IngestionJob {
                user_id: self.user.id,
                phone_number: PHONE.into(),
                profile_url: URL.into(),
            }
        }

        async fn reload(&self) -> User {
            self.store.get_user_by_phone(PHONE).await.unwrap().unwrap()
        }
    }

    #[tokio::test]
    async fn completes_and_records_catalog() {
        let h = Harness::new().await;
        let extractor = StubExtractor::with_profile(profile(&[
            "Beautiful handmade bag 🛍️ ₹1,299",
            "Fresh celebration cake 🎂 for ₹899",
            "Cozy crochet scarf 🧣 Rs. 799",
        ]));

        let outcome = h.pipeline(extractor, true).run(h.job()).await;
        let IngestionOutcome::Completed {
            catalog_id,
            product_count,
            business_name,
        } = outcome
        else {
            panic!("expected completion, got {outcome:?}");
        };
        assert_eq!(product_count, 3);
        assert_eq!(business_name, "Shop X");

        let catalog = h.store.get_catalog(catalog_id).await.unwrap().unwrap();
        assert_eq!(catalog.status, CatalogStatus::Completed);
        assert_eq!(catalog.product_count, 3);
        assert!(catalog.completed_at.is_some());
        assert_eq!(h.store.list_products(catalog_id).await.unwrap().len(), 3);

        let user = h.reload().await;
        assert_eq!(user.state.step, Step::Completed);
        assert_eq!(user.state.active_catalog_id, Some(catalog_id.to_string()));
        assert!(user.state.pending_url.is_none());
        assert!(!user.state.waiting_for_url);

        let sent = h.messenger.texts_to(PHONE);
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("📦 Products found: 3"));
    }

    #[tokio::test]
    async fn scrape_failure_fails_catalog_and_resets_user() {
        let h = Harness::new().await;
        let extractor = StubExtractor::failing(ExtractionError::BadStatus {
            url: URL.into(),
            status: 404,
        });

        let outcome = h.pipeline(extractor, true).run(h.job()).await;
        let IngestionOutcome::ScrapeFailed { catalog_id } = outcome else {
            panic!("expected scrape failure, got {outcome:?}");
        };

        let catalog = h.store.get_catalog(catalog_id).await.unwrap().unwrap();
        assert_eq!(catalog.status, CatalogStatus::Failed);
        assert!(catalog.completed_at.is_some());

        let user = h.reload().await;
        assert_eq!(user.state.step, Step::WaitingForUrl);
        assert!(user.state.waiting_for_url);
        assert!(user.state.pending_url.is_none());

        assert_eq!(h.messenger.texts_to(PHONE), vec![ErrorReply::ScrapingFailed.text()]);
    }

    #[tokio::test]
    async fn scrape_failure_without_reset_leaves_processing() {
        let h = Harness::new().await;
        let extractor = StubExtractor::failing(ExtractionError::Parse("boom".into()));

        let outcome = h.pipeline(extractor, false).run(h.job()).await;
        assert!(matches!(outcome, IngestionOutcome::ScrapeFailed { .. }));

        let user = h.reload().await;
        assert_eq!(user.state.step, Step::Processing);
        assert_eq!(user.state.pending_url.as_deref(), Some(URL));
    }

    #[tokio::test]
    async fn zero_products_leaves_catalog_processing() {
        let h = Harness::new().await;
        let extractor = StubExtractor::with_profile(profile(&["🔥", "sale"]));

        let outcome = h.pipeline(extractor, true).run(h.job()).await;
        let IngestionOutcome::NoProducts { catalog_id } = outcome else {
            panic!("expected no products, got {outcome:?}");
        };

        let catalog = h.store.get_catalog(catalog_id).await.unwrap().unwrap();
        assert_eq!(catalog.status, CatalogStatus::Processing);
        assert!(catalog.completed_at.is_none());
        assert!(h.store.list_products(catalog_id).await.unwrap().is_empty());

        assert_eq!(h.messenger.texts_to(PHONE), vec![ErrorReply::NoProducts.text()]);
        assert_eq!(h.reload().await.state.step, Step::WaitingForUrl);
    }

    #[tokio::test]
    async fn catalog_insert_failure_sends_general_error() {
        let h = Harness::new().await;
        let store = Arc::new(FailingStore::new(Arc::clone(&h.store)).fail_on("insert_catalog"));
        let extractor = StubExtractor::with_profile(profile(&["Beautiful handmade bag"]));

        let outcome = h.pipeline_with_store(store, extractor, true).run(h.job()).await;
        assert_eq!(
            outcome,
            IngestionOutcome::PersistFailed {
                catalog_id: None,
                stage: "insert_catalog"
            }
        );
        assert_eq!(h.messenger.texts_to(PHONE), vec![ErrorReply::General.text()]);
        assert_eq!(h.reload().await.state.step, Step::WaitingForUrl);
    }

    #[tokio::test]
    async fn product_insert_failure_fails_catalog() {
        let h = Harness::new().await;
        let store = Arc::new(FailingStore::new(Arc::clone(&h.store)).fail_on("insert_products"));
        let extractor = StubExtractor::with_profile(profile(&["Beautiful handmade bag"]));

        let outcome = h.pipeline_with_store(store, extractor, true).run(h.job()).await;
        let IngestionOutcome::PersistFailed {
            catalog_id: Some(catalog_id),
            stage: "insert_products",
        } = outcome
        else {
            panic!("expected product insert failure, got {outcome:?}");
        };

        let catalog = h.store.get_catalog(catalog_id).await.unwrap().unwrap();
        assert_eq!(catalog.status, CatalogStatus::Failed);
        assert_eq!(h.messenger.texts_to(PHONE), vec![ErrorReply::General.text()]);
    }

    #[tokio::test]
    async fn notification_failure_does_not_abort() {
        let h = Harness::new().await;
        let messenger = Arc::new(RecordingMessenger::failing());
        let pipeline = IngestionPipeline::new(
            Arc::clone(&h.store),
            messenger.clone(),
            Arc::new(StubExtractor::with_profile(profile(&["Beautiful handmade bag"]))),
            Arc::new(UserLocks::new()),
            ProductRules::new().unwrap(),
            true,
        );

        let outcome = pipeline.run(h.job()).await;
        assert!(outcome.is_completed());
        assert_eq!(h.reload().await.state.step, Step::Completed);
    }

    #[tokio::test]
    async fn reset_skips_users_who_moved_on() {
        let h = Harness::new().await;
        let mut user = h.reload().await;
        user.state.step = Step::Welcomed;
        user.state.waiting_for_url = true;
        user.state.pending_url = None;
        h.store.update_user_state(user.id, &user.state).await.unwrap();

        let extractor = StubExtractor::failing(ExtractionError::Parse("boom".into()));
        h.pipeline(extractor, true).run(h.job()).await;

        assert_eq!(h.reload().await.state.step, Step::Welcomed);
    }

    #[tokio::test]
    async fn job_slot_is_released_with_the_final_state() {
        let h = Harness::new().await;
        let locks = Arc::new(UserLocks::new());
        let extractor = Arc::new(
            StubExtractor::failing(ExtractionError::Parse("boom".into())).gated(),
        );
        let pipeline = Arc::new(IngestionPipeline::new(
            Arc::clone(&h.store),
            h.messenger.clone(),
            extractor.clone(),
            Arc::clone(&locks),
            ProductRules::new().unwrap(),
            true,
        ));
        let jobs = ActiveJobs::new();
        let slot = jobs.try_start(PHONE).unwrap();

        let task = tokio::spawn({
            let pipeline = Arc::clone(&pipeline);
            let job = h.job();
            async move { pipeline.run_exclusive(job, slot).await }
        });
        while extractor.calls().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // Hold the user lock across the failure: the slot and the stored
        // state must change together once it is released.
        let user_lock = locks.lock(PHONE).await;
        extractor.release();
        h.messenger.wait_for_texts(PHONE, 1, Duration::from_secs(5)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(jobs.is_active(PHONE));
        assert_eq!(h.reload().await.state.step, Step::Processing);

        drop(user_lock);
        let outcome = task.await.unwrap();
        assert!(matches!(outcome, IngestionOutcome::ScrapeFailed { .. }));
        assert!(!jobs.is_active(PHONE));
        assert_eq!(h.reload().await.state.step, Step::WaitingForUrl);
    }
}
