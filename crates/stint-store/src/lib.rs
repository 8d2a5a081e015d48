//! Persistent store for listings and companies.
//!
//! The [`Store`] trait is the seam between the sync pipeline and storage:
//! [`PgStore`] is the Postgres-backed production implementation, [`MemStore`]
//! backs dev runs and tests without a database.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use stint_core::{normalize_company_name, Category, Company, Listing};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub const CRATE_NAME: &str = "stint-store";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database operation failed: {0}")]
    Database(#[from] sqlx::Error),
}

/// Storage operations the pipeline needs. Companies accumulate forever;
/// listings are replaced wholesale by reconciliation.
#[async_trait]
pub trait Store: Send + Sync {
    /// All persisted companies.
    async fn companies(&self) -> Result<Vec<Company>, StoreError>;

    /// Bulk-insert new companies. A name conflict (concurrent insert of the
    /// same company) is ignored, not an error.
    async fn insert_companies(&self, pending: &[Company]) -> Result<(), StoreError>;

    /// Companies whose trimmed, case-folded name is in `names`. Used to pick
    /// up store-assigned ids after a bulk insert.
    async fn companies_by_normalized_names(
        &self,
        names: &[String],
    ) -> Result<Vec<Company>, StoreError>;

    /// Make the stored listing set set-equal to `batch`: upsert every batch
    /// row, delete every row whose id is absent from the batch, atomically.
    /// An empty batch is a deliberate no-op.
    async fn reconcile_listings(&self, batch: &[Listing]) -> Result<(), StoreError>;

    /// All persisted listings with their companies.
    async fn listings(&self) -> Result<Vec<Listing>, StoreError>;
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the schema. Idempotent.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS companies (
                id BIGSERIAL PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                url TEXT NOT NULL,
                logo_url TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS listings (
                id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                title TEXT NOT NULL,
                active BOOLEAN NOT NULL,
                date_updated TIMESTAMPTZ NOT NULL,
                is_visible BOOLEAN NOT NULL,
                date_posted TIMESTAMPTZ NOT NULL,
                url TEXT NOT NULL,
                locations TEXT[] NOT NULL DEFAULT '{}',
                terms TEXT[] NOT NULL DEFAULT '{}',
                sponsorship TEXT NOT NULL,
                category TEXT NOT NULL,
                top_tier BOOLEAN NOT NULL,
                company_id BIGINT NOT NULL REFERENCES companies(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        info!("schema migration applied");
        Ok(())
    }
}

fn company_from_row(row: &sqlx::postgres::PgRow) -> Result<Company, sqlx::Error> {
    Ok(Company {
        id: Some(row.try_get("id")?),
        name: row.try_get("name")?,
        url: row.try_get("url")?,
        logo_url: row.try_get("logo_url")?,
    })
}

#[async_trait]
impl Store for PgStore {
    async fn companies(&self) -> Result<Vec<Company>, StoreError> {
        let rows = sqlx::query("SELECT id, name, url, logo_url FROM companies")
            .fetch_all(&self.pool)
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(company_from_row(row)?);
        }
        Ok(out)
    }

    async fn insert_companies(&self, pending: &[Company]) -> Result<(), StoreError> {
        if pending.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for company in pending {
            sqlx::query(
                r#"
                INSERT INTO companies (name, url, logo_url)
                VALUES ($1, $2, $3)
                ON CONFLICT (name) DO NOTHING
                "#,
            )
            .bind(&company.name)
            .bind(&company.url)
            .bind(&company.logo_url)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        debug!(count = pending.len(), "inserted pending companies");
        Ok(())
    }

    async fn companies_by_normalized_names(
        &self,
        names: &[String],
    ) -> Result<Vec<Company>, StoreError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            r#"
            SELECT id, name, url, logo_url
              FROM companies
             WHERE lower(btrim(name)) = ANY($1)
            "#,
        )
        .bind(names)
        .fetch_all(&self.pool)
        .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(company_from_row(row)?);
        }
        Ok(out)
    }

    async fn reconcile_listings(&self, batch: &[Listing]) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for listing in batch {
            sqlx::query(
                r#"
                INSERT INTO listings (
                    id, source, title, active, date_updated, is_visible,
                    date_posted, url, locations, terms, sponsorship,
                    category, top_tier, company_id
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                ON CONFLICT (id) DO UPDATE SET
                    source = EXCLUDED.source,
                    title = EXCLUDED.title,
                    active = EXCLUDED.active,
                    date_updated = EXCLUDED.date_updated,
                    is_visible = EXCLUDED.is_visible,
                    date_posted = EXCLUDED.date_posted,
                    url = EXCLUDED.url,
                    locations = EXCLUDED.locations,
                    terms = EXCLUDED.terms,
                    sponsorship = EXCLUDED.sponsorship,
                    category = EXCLUDED.category,
                    top_tier = EXCLUDED.top_tier,
                    company_id = EXCLUDED.company_id
                "#,
            )
            .bind(&listing.id)
            .bind(&listing.source)
            .bind(&listing.title)
            .bind(listing.active)
            .bind(listing.date_updated)
            .bind(listing.is_visible)
            .bind(listing.date_posted)
            .bind(&listing.url)
            .bind(&listing.locations)
            .bind(&listing.terms)
            .bind(&listing.sponsorship)
            .bind(listing.category.as_str())
            .bind(listing.top_tier)
            .bind(listing.company.id)
            .execute(&mut *tx)
            .await?;
        }

        let batch_ids: Vec<String> = batch.iter().map(|l| l.id.clone()).collect();
        let deleted = sqlx::query("DELETE FROM listings WHERE NOT (id = ANY($1))")
            .bind(&batch_ids)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        info!(
            upserted = batch.len(),
            deleted = deleted.rows_affected(),
            "listings reconciled"
        );
        Ok(())
    }

    async fn listings(&self) -> Result<Vec<Listing>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT l.id, l.source, l.title, l.active, l.date_updated,
                   l.is_visible, l.date_posted, l.url, l.locations, l.terms,
                   l.sponsorship, l.category, l.top_tier,
                   c.id AS company_id, c.name, c.url AS company_url, c.logo_url
              FROM listings l
              JOIN companies c ON c.id = l.company_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let category: String = row.try_get("category")?;
            out.push(Listing {
                id: row.try_get("id")?,
                source: row.try_get("source")?,
                title: row.try_get("title")?,
                active: row.try_get("active")?,
                date_updated: row.try_get("date_updated")?,
                is_visible: row.try_get("is_visible")?,
                date_posted: row.try_get("date_posted")?,
                url: row.try_get("url")?,
                locations: row.try_get("locations")?,
                terms: row.try_get("terms")?,
                sponsorship: row.try_get("sponsorship")?,
                category: Category::from_label(&category).unwrap_or_default(),
                top_tier: row.try_get("top_tier")?,
                company: Company {
                    id: Some(row.try_get("company_id")?),
                    name: row.try_get("name")?,
                    url: row.try_get("company_url")?,
                    logo_url: row.try_get("logo_url")?,
                },
            });
        }
        Ok(out)
    }
}

/// In-memory store with the same semantics as [`PgStore`].
#[derive(Debug, Default)]
pub struct MemStore {
    inner: Mutex<MemInner>,
}

#[derive(Debug)]
struct MemInner {
    companies: Vec<Company>,
    next_company_id: i64,
    listings: BTreeMap<String, Listing>,
}

impl Default for MemInner {
    fn default() -> Self {
        Self {
            companies: Vec::new(),
            next_company_id: 1,
            listings: BTreeMap::new(),
        }
    }
}

#[async_trait]
impl Store for MemStore {
    async fn companies(&self) -> Result<Vec<Company>, StoreError> {
        Ok(self.inner.lock().await.companies.clone())
    }

    async fn insert_companies(&self, pending: &[Company]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        for company in pending {
            let key = company.normalized_name();
            if inner.companies.iter().any(|c| c.normalized_name() == key) {
                continue;
            }
            let id = inner.next_company_id;
            inner.next_company_id += 1;
            inner.companies.push(Company {
                id: Some(id),
                ..company.clone()
            });
        }
        Ok(())
    }

    async fn companies_by_normalized_names(
        &self,
        names: &[String],
    ) -> Result<Vec<Company>, StoreError> {
        let wanted: HashSet<&String> = names.iter().collect();
        Ok(self
            .inner
            .lock()
            .await
            .companies
            .iter()
            .filter(|c| wanted.contains(&c.normalized_name()))
            .cloned()
            .collect())
    }

    async fn reconcile_listings(&self, batch: &[Listing]) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut inner = self.inner.lock().await;
        let keep: HashSet<&str> = batch.iter().map(|l| l.id.as_str()).collect();
        inner.listings.retain(|id, _| keep.contains(id.as_str()));
        for listing in batch {
            inner.listings.insert(listing.id.clone(), listing.clone());
        }
        Ok(())
    }

    async fn listings(&self) -> Result<Vec<Listing>, StoreError> {
        Ok(self.inner.lock().await.listings.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn mk_listing(id: &str, title: &str) -> Listing {
        Listing {
            id: id.to_string(),
            source: "Simplify".to_string(),
            title: title.to_string(),
            active: true,
            date_updated: Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).single().unwrap(),
            is_visible: true,
            date_posted: Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).single().unwrap(),
            url: "https://example.com/apply".to_string(),
            locations: vec!["Remote".to_string()],
            terms: vec!["Summer 2026".to_string()],
            sponsorship: "Other".to_string(),
            category: Category::SoftwareEngineering,
            top_tier: false,
            company: Company {
                id: Some(1),
                name: "Acme Corp".to_string(),
                url: "https://acme.example.com".to_string(),
                logo_url: None,
            },
        }
    }

    #[tokio::test]
    async fn reconcile_makes_store_set_equal_to_batch() {
        let store = MemStore::default();
        store
            .reconcile_listings(&[mk_listing("a", "Old A"), mk_listing("b", "Old B")])
            .await
            .unwrap();

        // Next run: "a" updated, "b" gone, "c" new.
        store
            .reconcile_listings(&[mk_listing("a", "New A"), mk_listing("c", "New C")])
            .await
            .unwrap();

        let mut ids: Vec<String> = store
            .listings()
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "c"]);
        let a = store
            .listings()
            .await
            .unwrap()
            .into_iter()
            .find(|l| l.id == "a")
            .unwrap();
        assert_eq!(a.title, "New A");
    }

    #[tokio::test]
    async fn reconcile_is_idempotent() {
        let store = MemStore::default();
        let batch = vec![mk_listing("a", "A"), mk_listing("b", "B")];
        store.reconcile_listings(&batch).await.unwrap();
        let first = store.listings().await.unwrap();
        store.reconcile_listings(&batch).await.unwrap();
        let second = store.listings().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn empty_batch_leaves_listings_untouched() {
        let store = MemStore::default();
        store
            .reconcile_listings(&[mk_listing("a", "A")])
            .await
            .unwrap();
        store.reconcile_listings(&[]).await.unwrap();
        assert_eq!(store.listings().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn company_insert_ignores_name_conflicts_and_assigns_ids() {
        let store = MemStore::default();
        store
            .insert_companies(&[
                Company::unresolved("Google", "https://google.com"),
                Company::unresolved("google ", "https://google.com"),
                Company::unresolved("Stripe", "https://stripe.com"),
            ])
            .await
            .unwrap();

        let companies = store.companies().await.unwrap();
        assert_eq!(companies.len(), 2);
        assert!(companies.iter().all(|c| c.id.is_some()));

        let found = store
            .companies_by_normalized_names(&["google".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Google");
    }
}
