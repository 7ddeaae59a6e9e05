//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local files, in-memory databases and remote libSQL servers.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use secrecy::ExposeSecret;
use tracing::{debug, info};
use uuid::Uuid;

use crate::catalog::{Catalog, CatalogStatus, Product};
use crate::config::StoreConfig;
use crate::conversation::{ConversationState, Step, User};
use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open whichever store the configuration points at and run migrations.
    pub async fn open(config: &StoreConfig) -> Result<Self, DatabaseError> {
        if config.is_memory() {
            Self::new_memory().await
        } else if config.is_remote() {
            let token = config
                .auth_token
                .as_ref()
                .map(|t| t.expose_secret().to_string())
                .unwrap_or_default();
            Self::new_remote(&config.uri, token).await
        } else {
            Self::new_local(&config.local_path()).await
        }
    }

    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::connect(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Connect to a remote libSQL server and run migrations.
    pub async fn new_remote(url: &str, auth_token: String) -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_remote(url.to_string(), auth_token)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open remote database: {e}")))?;

        let backend = Self::connect(db).await?;
        info!(url, "Remote database connected");
        Ok(backend)
    }

    /// Create an in-memory database (for tests and throwaway runs).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        Self::connect(db).await
    }

    async fn connect(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::Query(format!("bad uuid {s:?}: {e}")))
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn row_to_user(row: &libsql::Row) -> Result<User, DatabaseError> {
    let get = |e: libsql::Error| DatabaseError::Query(format!("user row parse: {e}"));

    let id_str: String = row.get(0).map_err(get)?;
    let step_str: String = row.get(3).map_err(get)?;
    let waiting: i64 = row.get(4).unwrap_or(0);
    let created_str: String = row.get(7).map_err(get)?;
    let updated_str: String = row.get(8).map_err(get)?;

    Ok(User {
        id: parse_uuid(&id_str)?,
        phone_number: row.get(1).map_err(get)?,
        name: row.get(2).map_err(get)?,
        state: ConversationState {
            step: step_str.parse().unwrap_or(Step::New),
            waiting_for_url: waiting != 0,
            pending_url: row.get(5).ok(),
            active_catalog_id: row.get(6).ok(),
        },
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

fn row_to_catalog(row: &libsql::Row) -> Result<Catalog, DatabaseError> {
    let get = |e: libsql::Error| DatabaseError::Query(format!("catalog row parse: {e}"));

    let id_str: String = row.get(0).map_err(get)?;
    let user_str: String = row.get(1).map_err(get)?;
    let status_str: String = row.get(3).map_err(get)?;
    let count: i64 = row.get(4).unwrap_or(0);
    let created_str: String = row.get(6).map_err(get)?;
    let completed_str: Option<String> = row.get(7).ok();

    Ok(Catalog {
        id: parse_uuid(&id_str)?,
        user_id: parse_uuid(&user_str)?,
        source_url: row.get(2).map_err(get)?,
        status: status_str.parse().unwrap_or(CatalogStatus::Processing),
        product_count: u32::try_from(count).unwrap_or(0),
        business_name: row.get(5).unwrap_or_default(),
        created_at: parse_datetime(&created_str),
        completed_at: completed_str.as_deref().map(parse_datetime),
    })
}

fn row_to_product(row: &libsql::Row) -> Result<Product, DatabaseError> {
    let get = |e: libsql::Error| DatabaseError::Query(format!("product row parse: {e}"));

    let id_str: String = row.get(0).map_err(get)?;
    let user_str: String = row.get(1).map_err(get)?;
    let catalog_str: String = row.get(2).map_err(get)?;
    let created_str: String = row.get(8).map_err(get)?;

    Ok(Product {
        id: parse_uuid(&id_str)?,
        user_id: parse_uuid(&user_str)?,
        catalog_id: parse_uuid(&catalog_str)?,
        name: row.get(3).map_err(get)?,
        description: row.get(4).map_err(get)?,
        price: row.get(5).ok(),
        image_url: row.get(6).unwrap_or_default(),
        post_url: row.get(7).unwrap_or_default(),
        created_at: parse_datetime(&created_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

const USER_COLUMNS: &str = "id, phone_number, name, step, waiting_for_url, pending_url, active_catalog_id, created_at, updated_at";

const CATALOG_COLUMNS: &str =
    "id, user_id, source_url, status, product_count, business_name, created_at, completed_at";

const PRODUCT_COLUMNS: &str =
    "id, user_id, catalog_id, name, description, price, image_url, post_url, created_at";

/// Placeholder groups for a multi-row insert, e.g. `(?1, ?2), (?3, ?4)`.
fn value_groups(rows: usize, width: usize) -> String {
    (0..rows)
        .map(|r| {
            let cols: Vec<String> = (1..=width).map(|c| format!("?{}", r * width + c)).collect();
            format!("({})", cols.join(", "))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Users ───────────────────────────────────────────────────────

    async fn get_user_by_phone(&self, phone_number: &str) -> Result<Option<User>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE phone_number = ?1"),
                params![phone_number],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_user_by_phone: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_user(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_user_by_phone: {e}"))),
        }
    }

    async fn insert_user_if_absent(&self, user: &User) -> Result<bool, DatabaseError> {
        let state = &user.state;
        let inserted = self
            .conn()
            .execute(
                &format!(
                    "INSERT INTO users ({USER_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                     ON CONFLICT(phone_number) DO NOTHING"
                ),
                params![
                    user.id.to_string(),
                    user.phone_number.as_str(),
                    user.name.as_str(),
                    state.step.as_str(),
                    i64::from(state.waiting_for_url),
                    opt_text(state.pending_url.as_deref()),
                    opt_text(state.active_catalog_id.as_deref()),
                    user.created_at.to_rfc3339(),
                    user.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_user_if_absent: {e}")))?;

        if inserted > 0 {
            debug!(user_id = %user.id, phone = %user.phone_number, "User inserted into DB");
        }
        Ok(inserted > 0)
    }

    async fn update_user_state(
        &self,
        user_id: Uuid,
        state: &ConversationState,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let updated = self
            .conn()
            .execute(
                "UPDATE users SET step = ?1, waiting_for_url = ?2, pending_url = ?3,
                    active_catalog_id = ?4, updated_at = ?5
                 WHERE id = ?6",
                params![
                    state.step.as_str(),
                    i64::from(state.waiting_for_url),
                    opt_text(state.pending_url.as_deref()),
                    opt_text(state.active_catalog_id.as_deref()),
                    now,
                    user_id.to_string(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_user_state: {e}")))?;

        if updated == 0 {
            return Err(DatabaseError::NotFound {
                entity: "user".into(),
                id: user_id.to_string(),
            });
        }

        debug!(user_id = %user_id, step = %state.step, "User state updated in DB");
        Ok(())
    }

    // ── Catalogs ────────────────────────────────────────────────────

    async fn insert_catalog(&self, catalog: &Catalog) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO catalogs ({CATALOG_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
                ),
                params![
                    catalog.id.to_string(),
                    catalog.user_id.to_string(),
                    catalog.source_url.as_str(),
                    catalog.status.as_str(),
                    i64::from(catalog.product_count),
                    catalog.business_name.as_str(),
                    catalog.created_at.to_rfc3339(),
                    opt_text(catalog.completed_at.map(|t| t.to_rfc3339()).as_deref()),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_catalog: {e}")))?;

        debug!(catalog_id = %catalog.id, user_id = %catalog.user_id, "Catalog inserted into DB");
        Ok(())
    }

    async fn get_catalog(&self, id: Uuid) -> Result<Option<Catalog>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {CATALOG_COLUMNS} FROM catalogs WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_catalog: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_catalog(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_catalog: {e}"))),
        }
    }

    async fn list_catalogs_for_user(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Catalog>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CATALOG_COLUMNS} FROM catalogs WHERE user_id = ?1
                     ORDER BY created_at DESC LIMIT ?2"
                ),
                params![user_id.to_string(), limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_catalogs_for_user: {e}")))?;

        let mut catalogs = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_catalogs_for_user: {e}")))?
        {
            catalogs.push(row_to_catalog(&row)?);
        }
        Ok(catalogs)
    }

    async fn mark_catalog_failed(&self, id: Uuid) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let updated = self
            .conn()
            .execute(
                "UPDATE catalogs SET status = ?1, completed_at = ?2 WHERE id = ?3",
                params![CatalogStatus::Failed.as_str(), now, id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_catalog_failed: {e}")))?;

        if updated == 0 {
            return Err(DatabaseError::NotFound {
                entity: "catalog".into(),
                id: id.to_string(),
            });
        }

        debug!(catalog_id = %id, "Catalog marked failed in DB");
        Ok(())
    }

    async fn complete_catalog(
        &self,
        id: Uuid,
        product_count: u32,
        business_name: &str,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let updated = self
            .conn()
            .execute(
                "UPDATE catalogs SET status = ?1, product_count = ?2, business_name = ?3,
                    completed_at = ?4
                 WHERE id = ?5",
                params![
                    CatalogStatus::Completed.as_str(),
                    i64::from(product_count),
                    business_name,
                    now,
                    id.to_string(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("complete_catalog: {e}")))?;

        if updated == 0 {
            return Err(DatabaseError::NotFound {
                entity: "catalog".into(),
                id: id.to_string(),
            });
        }

        debug!(catalog_id = %id, product_count, "Catalog completed in DB");
        Ok(())
    }

    // ── Products ────────────────────────────────────────────────────

    async fn insert_products(&self, products: &[Product]) -> Result<usize, DatabaseError> {
        if products.is_empty() {
            return Ok(0);
        }

        const WIDTH: usize = 9;
        let mut values = Vec::with_capacity(products.len() * WIDTH);
        for p in products {
            values.extend([
                libsql::Value::Text(p.id.to_string()),
                libsql::Value::Text(p.user_id.to_string()),
                libsql::Value::Text(p.catalog_id.to_string()),
                libsql::Value::Text(p.name.clone()),
                libsql::Value::Text(p.description.clone()),
                opt_text(p.price.as_deref()),
                libsql::Value::Text(p.image_url.clone()),
                libsql::Value::Text(p.post_url.clone()),
                libsql::Value::Text(p.created_at.to_rfc3339()),
            ]);
        }

        let sql = format!(
            "INSERT INTO products ({PRODUCT_COLUMNS}) VALUES {}",
            value_groups(products.len(), WIDTH)
        );
        let inserted = self
            .conn()
            .execute(&sql, libsql::params::Params::Positional(values))
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_products: {e}")))?;

        debug!(count = inserted, "Products inserted into DB");
        Ok(inserted as usize)
    }

    async fn list_products(&self, catalog_id: Uuid) -> Result<Vec<Product>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {PRODUCT_COLUMNS} FROM products WHERE catalog_id = ?1 ORDER BY rowid"
                ),
                params![catalog_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_products: {e}")))?;

        let mut products = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_products: {e}")))?
        {
            products.push(row_to_product(&row)?);
        }
        Ok(products)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    async fn seeded_user(db: &LibSqlBackend) -> User {
        let user = User::new("15550001111", Some("Asha"));
        assert!(db.insert_user_if_absent(&user).await.unwrap());
        user
    }

    fn product(user: &User, catalog: &Catalog, name: &str, price: Option<&str>) -> Product {
        Product {
            id: Uuid::new_v4(),
            user_id: user.id,
            catalog_id: catalog.id,
            name: name.into(),
            description: format!("{name} description"),
            price: price.map(String::from),
            image_url: format!("https://cdn.example/{name}.jpg"),
            post_url: format!("https://www.instagram.com/p/{name}/"),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn value_groups_number_sequentially() {
        assert_eq!(value_groups(2, 3), "(?1, ?2, ?3), (?4, ?5, ?6)");
        assert_eq!(value_groups(1, 1), "(?1)");
    }

    #[test]
    fn parse_datetime_accepts_sqlite_format() {
        let dt = parse_datetime("2026-01-02 03:04:05");
        assert_eq!(dt.to_rfc3339(), "2026-01-02T03:04:05+00:00");
        assert_eq!(parse_datetime("garbage"), DateTime::<Utc>::MIN_UTC);
    }

    // ── User tests ──────────────────────────────────────────────────

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let db = test_db().await;
        db.run_migrations().await.unwrap();
        assert_eq!(
            migrations::current_version(db.conn()).await.unwrap(),
            migrations::latest_version()
        );
    }

    #[tokio::test]
    async fn user_round_trip() {
        let db = test_db().await;
        let user = seeded_user(&db).await;

        let fetched = db.get_user_by_phone("15550001111").await.unwrap().unwrap();
        assert_eq!(fetched.id, user.id);
        assert_eq!(fetched.name, "Asha");
        assert_eq!(fetched.state, ConversationState::default());
        assert!(db.get_user_by_phone("0000").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_phone_is_not_inserted() {
        let db = test_db().await;
        let first = seeded_user(&db).await;

        let second = User::new("15550001111", None);
        assert!(!db.insert_user_if_absent(&second).await.unwrap());

        let fetched = db.get_user_by_phone("15550001111").await.unwrap().unwrap();
        assert_eq!(fetched.id, first.id);
    }

    #[tokio::test]
    async fn update_state_persists_every_field() {
        let db = test_db().await;
        let user = seeded_user(&db).await;

        let mut state = ConversationState::default();
        state.start_processing("https://www.instagram.com/shop_x/");
        db.update_user_state(user.id, &state).await.unwrap();

        let fetched = db.get_user_by_phone(&user.phone_number).await.unwrap().unwrap();
        assert_eq!(fetched.state, state);
        assert!(fetched.updated_at >= user.updated_at);

        state.complete("cat-1");
        db.update_user_state(user.id, &state).await.unwrap();
        let fetched = db.get_user_by_phone(&user.phone_number).await.unwrap().unwrap();
        assert_eq!(fetched.state.step, Step::Completed);
        assert!(fetched.state.pending_url.is_none());
        assert_eq!(fetched.state.active_catalog_id.as_deref(), Some("cat-1"));
    }

    #[tokio::test]
    async fn update_state_for_unknown_user_is_not_found() {
        let db = test_db().await;
        let err = db
            .update_user_state(Uuid::new_v4(), &ConversationState::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    // ── Catalog tests ───────────────────────────────────────────────

    #[tokio::test]
    async fn catalog_lifecycle_completed() {
        let db = test_db().await;
        let user = seeded_user(&db).await;
        let catalog = Catalog::new(user.id, "https://www.instagram.com/shop_x/");
        db.insert_catalog(&catalog).await.unwrap();

        let fetched = db.get_catalog(catalog.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, CatalogStatus::Processing);
        assert!(fetched.completed_at.is_none());

        db.complete_catalog(catalog.id, 3, "Shop X").await.unwrap();
        let fetched = db.get_catalog(catalog.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, CatalogStatus::Completed);
        assert_eq!(fetched.product_count, 3);
        assert_eq!(fetched.business_name, "Shop X");
        assert!(fetched.completed_at.is_some());
    }

    #[tokio::test]
    async fn catalog_lifecycle_failed() {
        let db = test_db().await;
        let user = seeded_user(&db).await;
        let catalog = Catalog::new(user.id, "https://www.instagram.com/shop_x/");
        db.insert_catalog(&catalog).await.unwrap();

        db.mark_catalog_failed(catalog.id).await.unwrap();
        let fetched = db.get_catalog(catalog.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, CatalogStatus::Failed);
        assert!(fetched.completed_at.is_some());

        let err = db.mark_catalog_failed(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[tokio::test]
    async fn list_catalogs_newest_first() {
        let db = test_db().await;
        let user = seeded_user(&db).await;

        let mut older = Catalog::new(user.id, "https://www.instagram.com/a/");
        older.created_at = Utc::now() - chrono::Duration::minutes(5);
        let newer = Catalog::new(user.id, "https://www.instagram.com/b/");
        db.insert_catalog(&older).await.unwrap();
        db.insert_catalog(&newer).await.unwrap();

        let listed = db.list_catalogs_for_user(user.id, 10).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, newer.id);

        let limited = db.list_catalogs_for_user(user.id, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    // ── Product tests ───────────────────────────────────────────────

    #[tokio::test]
    async fn insert_products_in_one_batch() {
        let db = test_db().await;
        let user = seeded_user(&db).await;
        let catalog = Catalog::new(user.id, "https://www.instagram.com/shop_x/");
        db.insert_catalog(&catalog).await.unwrap();

        let products = vec![
            product(&user, &catalog, "kurta", Some("₹1,299")),
            product(&user, &catalog, "saree", None),
            product(&user, &catalog, "dupatta", Some("₹450")),
        ];
        assert_eq!(db.insert_products(&products).await.unwrap(), 3);

        let listed = db.list_products(catalog.id).await.unwrap();
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].name, "kurta");
        assert_eq!(listed[0].price.as_deref(), Some("₹1,299"));
        assert!(listed[1].price.is_none());
        assert_eq!(listed[2].catalog_id, catalog.id);
    }

    #[tokio::test]
    async fn insert_no_products_is_a_noop() {
        let db = test_db().await;
        assert_eq!(db.insert_products(&[]).await.unwrap(), 0);
        assert!(db.list_products(Uuid::new_v4()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn local_file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("bot.db");

        let user = {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            seeded_user(&db).await
        };

        let db = LibSqlBackend::new_local(&path).await.unwrap();
        let fetched = db.get_user_by_phone("15550001111").await.unwrap().unwrap();
        assert_eq!(fetched.id, user.id);
    }
}
