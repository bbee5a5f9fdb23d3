//! Postgres-backed catalog store.
//!
//! ## Error Mapping
//!
//! | SQLx error | SQLSTATE | StoreError |
//! |------------|----------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (foreign key violation) | `23503` | `Integrity` |
//! | Database (check violation) | `23514` | `Integrity` |
//! | Database (other), PoolClosed, other | any | `Backend` |
//!
//! `commit` runs in a single transaction; any error rolls the whole change set back.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{Span, instrument};
use uuid::Uuid;

use restock_catalog::{ImportBatch, ImportBatchItem, PriceChangeKind, PriceHistory, Product};
use restock_core::{BatchId, BatchItemId, PriceHistoryId, ProductId};
use restock_reconcile::BatchSummary;

use super::r#trait::{CatalogStore, ChangeSet, Reassignment, StoreError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS products (
    id            UUID PRIMARY KEY,
    sku           TEXT NULL UNIQUE,
    upc           TEXT NULL UNIQUE,
    name          TEXT NOT NULL,
    description   TEXT NULL,
    cost          DOUBLE PRECISION NOT NULL DEFAULT 0 CHECK (cost >= 0),
    selling_price DOUBLE PRECISION NOT NULL DEFAULT 0 CHECK (selling_price >= 0),
    stock         DOUBLE PRECISION NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS price_history (
    id          UUID PRIMARY KEY,
    product_id  UUID NOT NULL REFERENCES products(id) ON DELETE CASCADE,
    kind        TEXT NOT NULL CHECK (kind IN ('COST', 'SELLING_PRICE')),
    old_value   DOUBLE PRECISION NOT NULL,
    new_value   DOUBLE PRECISION NOT NULL,
    recorded_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS price_history_product_idx ON price_history (product_id, recorded_at DESC);

CREATE TABLE IF NOT EXISTS import_batches (
    id         UUID PRIMARY KEY,
    label      TEXT NOT NULL UNIQUE,
    created_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS import_batch_items (
    id         UUID PRIMARY KEY,
    batch_id   UUID NOT NULL REFERENCES import_batches(id) ON DELETE CASCADE,
    product_id UUID NOT NULL REFERENCES products(id) ON DELETE CASCADE,
    quantity   DOUBLE PRECISION NOT NULL,
    UNIQUE (batch_id, product_id)
);
"#;

const PRODUCT_COLUMNS: &str = "id, sku, upc, name, description, cost, selling_price, stock";

/// Postgres-backed catalog store.
///
/// Uses the SQLx connection pool, which is `Send + Sync`; clones share the pool.
#[derive(Debug, Clone)]
pub struct PostgresCatalogStore {
    pool: Arc<PgPool>,
}

impl PostgresCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for PostgresCatalogStore {
    #[instrument(skip(self), fields(rows = tracing::field::Empty), err)]
    async fn list_all_products(&self) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY id"))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_all_products", e))?;
        Span::current().record("rows", rows.len());
        rows.iter().map(product_from_row).collect()
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_product", e))?;
        row.as_ref().map(product_from_row).transpose()
    }

    async fn find_batch_by_label(&self, label: &str) -> Result<Option<ImportBatch>, StoreError> {
        let row = sqlx::query("SELECT id, label, created_at FROM import_batches WHERE label = $1")
            .bind(label)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_batch_by_label", e))?;
        row.as_ref().map(batch_from_row).transpose()
    }

    async fn get_batch(&self, id: BatchId) -> Result<Option<ImportBatch>, StoreError> {
        let row = sqlx::query("SELECT id, label, created_at FROM import_batches WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_batch", e))?;
        row.as_ref().map(batch_from_row).transpose()
    }

    async fn list_batches(&self) -> Result<Vec<BatchSummary>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT
                b.id,
                b.label,
                b.created_at,
                COUNT(i.id) AS item_count,
                COALESCE(SUM(i.quantity), 0) AS total_quantity
            FROM import_batches b
            LEFT JOIN import_batch_items i ON i.batch_id = b.id
            GROUP BY b.id, b.label, b.created_at
            ORDER BY b.created_at DESC, b.id DESC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_batches", e))?;

        rows.iter()
            .map(|row| {
                let item_count: i64 = row.try_get("item_count").map_err(decode_error)?;
                Ok(BatchSummary {
                    batch: batch_from_row(row)?,
                    item_count: item_count as usize,
                    total_quantity: row.try_get("total_quantity").map_err(decode_error)?,
                })
            })
            .collect()
    }

    async fn list_items_for_batch(&self, id: BatchId) -> Result<Vec<ImportBatchItem>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, batch_id, product_id, quantity FROM import_batch_items WHERE batch_id = $1 ORDER BY id",
        )
        .bind(id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_items_for_batch", e))?;
        rows.iter().map(item_from_row).collect()
    }

    async fn list_history(&self, id: ProductId) -> Result<Vec<PriceHistory>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, product_id, kind, old_value, new_value, recorded_at
            FROM price_history
            WHERE product_id = $1
            ORDER BY recorded_at DESC, id DESC
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_history", e))?;
        rows.iter().map(history_from_row).collect()
    }

    #[instrument(skip(self), fields(batch_id = %id), err)]
    async fn rename_batch(&self, id: BatchId, label: &str) -> Result<ImportBatch, StoreError> {
        let row = sqlx::query(
            "UPDATE import_batches SET label = $2 WHERE id = $1 RETURNING id, label, created_at",
        )
        .bind(id.as_uuid())
        .bind(label)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("rename_batch", e))?;
        match row {
            Some(row) => batch_from_row(&row),
            None => Err(StoreError::NotFound(format!("batch {id}"))),
        }
    }

    #[instrument(
        skip(self, changes),
        fields(
            created = changes.created.len(),
            updated = changes.updated.len(),
            deleted = changes.deleted.len(),
            history = changes.history.len(),
            items = changes.batch_items.len()
        ),
        err
    )]
    async fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // Dropping `tx` on an early return rolls the transaction back.
        if let Some(batch) = &changes.batch {
            sqlx::query("INSERT INTO import_batches (id, label, created_at) VALUES ($1, $2, $3)")
                .bind(batch.id.as_uuid())
                .bind(&batch.label)
                .bind(batch.created_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("insert_batch", e))?;
        }

        for r in &changes.reassignments {
            reassign(&mut tx, *r).await?;
        }

        for id in &changes.deleted {
            let done = sqlx::query("DELETE FROM products WHERE id = $1")
                .bind(id.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("delete_product", e))?;
            if done.rows_affected() == 0 {
                return Err(StoreError::NotFound(format!("product {id}")));
            }
        }

        for p in &changes.created {
            sqlx::query(&format!(
                "INSERT INTO products ({PRODUCT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
            ))
            .bind(p.id.as_uuid())
            .bind(p.sku())
            .bind(p.upc())
            .bind(&p.name)
            .bind(p.description.as_deref())
            .bind(p.cost)
            .bind(p.selling_price)
            .bind(p.stock)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_product", e))?;
        }

        for p in &changes.updated {
            let done = sqlx::query(
                r#"
                UPDATE products
                SET sku = $2, upc = $3, name = $4, description = $5,
                    cost = $6, selling_price = $7, stock = $8
                WHERE id = $1
                "#,
            )
            .bind(p.id.as_uuid())
            .bind(p.sku())
            .bind(p.upc())
            .bind(&p.name)
            .bind(p.description.as_deref())
            .bind(p.cost)
            .bind(p.selling_price)
            .bind(p.stock)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_product", e))?;
            if done.rows_affected() == 0 {
                return Err(StoreError::NotFound(format!("product {}", p.id)));
            }
        }

        for h in &changes.history {
            sqlx::query(
                r#"
                INSERT INTO price_history (id, product_id, kind, old_value, new_value, recorded_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(h.id.as_uuid())
            .bind(h.product_id.as_uuid())
            .bind(h.kind.as_str())
            .bind(h.old_value)
            .bind(h.new_value)
            .bind(h.recorded_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_price_history", e))?;
        }

        for item in &changes.batch_items {
            sqlx::query(
                "INSERT INTO import_batch_items (id, batch_id, product_id, quantity) VALUES ($1, $2, $3, $4)",
            )
            .bind(item.id.as_uuid())
            .bind(item.batch_id.as_uuid())
            .bind(item.product_id.as_uuid())
            .bind(item.quantity)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_batch_item", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }
}

/// Move history and batch items from `r.from` to `r.to`, folding items that
/// would otherwise give `r.to` two rows in the same batch.
async fn reassign(tx: &mut Transaction<'_, Postgres>, r: Reassignment) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        UPDATE import_batch_items k
        SET quantity = k.quantity + d.quantity
        FROM import_batch_items d
        WHERE k.product_id = $2 AND d.product_id = $1 AND k.batch_id = d.batch_id
        "#,
    )
    .bind(r.from.as_uuid())
    .bind(r.to.as_uuid())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("fold_batch_items", e))?;

    sqlx::query(
        r#"
        DELETE FROM import_batch_items d
        USING import_batch_items k
        WHERE d.product_id = $1 AND k.product_id = $2 AND d.batch_id = k.batch_id
        "#,
    )
    .bind(r.from.as_uuid())
    .bind(r.to.as_uuid())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("drop_folded_items", e))?;

    for (operation, table) in [
        ("reassign_batch_items", "import_batch_items"),
        ("reassign_price_history", "price_history"),
    ] {
        sqlx::query(&format!("UPDATE {table} SET product_id = $2 WHERE product_id = $1"))
            .bind(r.from.as_uuid())
            .bind(r.to.as_uuid())
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
    }
    Ok(())
}

fn product_from_row(row: &PgRow) -> Result<Product, StoreError> {
    Ok(Product {
        id: ProductId::from_uuid(row.try_get::<Uuid, _>("id").map_err(decode_error)?),
        sku: row.try_get("sku").map_err(decode_error)?,
        upc: row.try_get("upc").map_err(decode_error)?,
        name: row.try_get("name").map_err(decode_error)?,
        description: row.try_get("description").map_err(decode_error)?,
        cost: row.try_get("cost").map_err(decode_error)?,
        selling_price: row.try_get("selling_price").map_err(decode_error)?,
        stock: row.try_get("stock").map_err(decode_error)?,
    })
}

fn batch_from_row(row: &PgRow) -> Result<ImportBatch, StoreError> {
    Ok(ImportBatch {
        id: BatchId::from_uuid(row.try_get::<Uuid, _>("id").map_err(decode_error)?),
        label: row.try_get("label").map_err(decode_error)?,
        created_at: row
            .try_get::<DateTime<Utc>, _>("created_at")
            .map_err(decode_error)?,
    })
}

fn item_from_row(row: &PgRow) -> Result<ImportBatchItem, StoreError> {
    Ok(ImportBatchItem {
        id: BatchItemId::from_uuid(row.try_get::<Uuid, _>("id").map_err(decode_error)?),
        batch_id: BatchId::from_uuid(row.try_get::<Uuid, _>("batch_id").map_err(decode_error)?),
        product_id: ProductId::from_uuid(
            row.try_get::<Uuid, _>("product_id").map_err(decode_error)?,
        ),
        quantity: row.try_get("quantity").map_err(decode_error)?,
    })
}

fn history_from_row(row: &PgRow) -> Result<PriceHistory, StoreError> {
    let kind: String = row.try_get("kind").map_err(decode_error)?;
    Ok(PriceHistory {
        id: PriceHistoryId::from_uuid(row.try_get::<Uuid, _>("id").map_err(decode_error)?),
        product_id: ProductId::from_uuid(
            row.try_get::<Uuid, _>("product_id").map_err(decode_error)?,
        ),
        kind: kind
            .parse::<PriceChangeKind>()
            .map_err(|e| StoreError::Integrity(e.to_string()))?,
        old_value: row.try_get("old_value").map_err(decode_error)?,
        new_value: row.try_get("new_value").map_err(decode_error)?,
        recorded_at: row.try_get("recorded_at").map_err(decode_error)?,
    })
}

fn decode_error(err: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("failed to decode row: {err}"))
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                Some("23503") | Some("23514") => StoreError::Integrity(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}
