use async_trait::async_trait;

use crate::{
    application::repos::{RecordStore, RepoError},
    domain::Product,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct ProductRow {
    pid: i64,
    name: String,
    describe: String,
    sku_id: i64,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            pid: row.pid,
            name: row.name,
            describe: row.describe,
            sku_id: row.sku_id,
        }
    }
}

impl PostgresRepositories {
    /// Insert or replace a product.
    pub async fn upsert_product(&self, product: &Product) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO products (pid, name, "describe", sku_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (pid) DO UPDATE
               SET name = EXCLUDED.name,
                   "describe" = EXCLUDED."describe",
                   sku_id = EXCLUDED.sku_id
            "#,
        )
        .bind(product.pid)
        .bind(&product.name)
        .bind(&product.describe)
        .bind(product.sku_id)
        .execute(self.pool())
        .await
        .map(|_| ())
        .map_err(map_sqlx_error)
    }

    /// Delete a product, returning whether a row was removed.
    pub async fn delete_product(&self, pid: i64) -> Result<bool, RepoError> {
        sqlx::query("DELETE FROM products WHERE pid = $1")
            .bind(pid)
            .execute(self.pool())
            .await
            .map(|result| result.rows_affected() > 0)
            .map_err(map_sqlx_error)
    }
}

#[async_trait]
impl RecordStore for PostgresRepositories {
    type Record = Product;

    async fn get_by_identifier(&self, id: i64) -> Result<Option<Product>, RepoError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r#"
            SELECT pid, name, "describe", sku_id
              FROM products
             WHERE pid = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(Product::from))
    }
}
