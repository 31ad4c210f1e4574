use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{pooled_connection::bb8::Pool, AsyncConnection, AsyncPgConnection, RunQueryDsl};

use crate::models::*;
use crate::schema::*;

pub type DbPool = Pool<AsyncPgConnection>;

#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Inserts `seeds` only when the table holds no rows at all.
    async fn seed_if_empty(&self, seeds: &[NewProduct]) -> Result<SeedOutcome>;

    async fn list(&self) -> Result<Vec<Product>>;

    /// Takes one unit off `product_id` if it has any left.
    ///
    /// With a `message_id`, the decrement and the record of that id commit
    /// together, so a redelivered message is applied at most once.
    async fn decrement_stock(
        &self,
        product_id: &str,
        message_id: Option<&str>,
    ) -> Result<DecrementOutcome>;
}

pub struct PgProductRepository {
    pool: DbPool,
}

impl PgProductRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProductRepository for PgProductRepository {
    async fn seed_if_empty(&self, seeds: &[NewProduct]) -> Result<SeedOutcome> {
        let seeds = seeds.to_vec();
        let mut conn = self.pool.get().await?;

        conn.transaction::<_, anyhow::Error, _>(|conn| {
            Box::pin(async move {
                let existing: i64 = products::table.count().get_result(conn).await?;
                if existing > 0 {
                    return Ok(SeedOutcome::AlreadySeeded);
                }

                let inserted = diesel::insert_into(products::table)
                    .values(&seeds)
                    .execute(conn)
                    .await?;

                Ok(SeedOutcome::Seeded(inserted))
            })
        })
        .await
    }

    async fn list(&self) -> Result<Vec<Product>> {
        let mut conn = self.pool.get().await?;

        let rows = products::table
            .order(products::id.asc())
            .load::<Product>(&mut conn)
            .await?;

        Ok(rows)
    }

    async fn decrement_stock(
        &self,
        product_id: &str,
        message_id: Option<&str>,
    ) -> Result<DecrementOutcome> {
        let product_id = product_id.to_string();
        let message_id = message_id.map(str::to_string);
        let mut conn = self.pool.get().await?;

        conn.transaction::<_, anyhow::Error, _>(|conn| {
            Box::pin(async move {
                if let Some(message_id) = message_id {
                    let recorded = diesel::insert_into(processed_messages::table)
                        .values(&NewProcessedMessage {
                            message_id,
                            product_id: product_id.clone(),
                            processed_at: Utc::now(),
                        })
                        .on_conflict_do_nothing()
                        .execute(conn)
                        .await?;

                    if recorded == 0 {
                        return Ok(DecrementOutcome::AlreadyProcessed);
                    }
                }

                // Conditional update: stock never drops below zero even under
                // concurrent deliveries.
                let new_stock = diesel::update(
                    products::table
                        .filter(products::id.eq(&product_id))
                        .filter(products::stock.gt(0)),
                )
                .set(products::stock.eq(products::stock - 1))
                .returning(products::stock)
                .get_result::<i32>(conn)
                .await
                .optional()?;

                if let Some(new_stock) = new_stock {
                    return Ok(DecrementOutcome::Decremented { new_stock });
                }

                let exists = diesel::select(diesel::dsl::exists(
                    products::table.filter(products::id.eq(&product_id)),
                ))
                .get_result::<bool>(conn)
                .await?;

                Ok(if exists {
                    DecrementOutcome::OutOfStock
                } else {
                    DecrementOutcome::NotFound
                })
            })
        })
        .await
    }
}

#[cfg(test)]
pub use memory::InMemoryProductRepository;


#[cfg(test)]
mod tests {
    use super::*;

    fn seeds() -> Vec<NewProduct> {
        vec![
            NewProduct::new("123", "Laptop", 10),
            NewProduct::new("456", "Mouse", 50),
        ]
    }

    #[tokio::test]
    async fn seeding_twice_changes_nothing() {
        let repo = InMemoryProductRepository::new();

        assert_eq!(repo.seed_if_empty(&seeds()).await.unwrap(), SeedOutcome::Seeded(2));
        repo.decrement_stock("123", None).await.unwrap();
        assert_eq!(repo.seed_if_empty(&seeds()).await.unwrap(), SeedOutcome::AlreadySeeded);

        let products = repo.list().await.unwrap();
        assert_eq!(products.len(), 2);
        assert_eq!(repo.stock_of("123").await, Some(9));
    }

    #[tokio::test]
    async fn list_is_ordered_by_id() {
        let repo = InMemoryProductRepository::new();
        repo.seed_if_empty(&[
            NewProduct::new("456", "Mouse", 50),
            NewProduct::new("123", "Laptop", 10),
        ])
        .await
        .unwrap();

        let ids: Vec<_> = repo.list().await.unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["123", "456"]);
    }

    #[tokio::test]
    async fn decrement_stops_at_zero() {
        let repo = InMemoryProductRepository::new();
        repo.seed_if_empty(&seeds()).await.unwrap();
        repo.set_stock("123", 1).await;

        assert_eq!(
            repo.decrement_stock("123", None).await.unwrap(),
            DecrementOutcome::Decremented { new_stock: 0 }
        );
        assert_eq!(
            repo.decrement_stock("123", None).await.unwrap(),
            DecrementOutcome::OutOfStock
        );
        assert_eq!(repo.stock_of("123").await, Some(0));
    }

    #[tokio::test]
    async fn decrement_unknown_product() {
        let repo = InMemoryProductRepository::new();
        repo.seed_if_empty(&seeds()).await.unwrap();

        assert_eq!(
            repo.decrement_stock("999", None).await.unwrap(),
            DecrementOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn oversized_product_id_is_not_found() {
        let repo = InMemoryProductRepository::new();
        repo.seed_if_empty(&seeds()).await.unwrap();

        assert_eq!(
            repo.decrement_stock(&"9".repeat(300), Some("m-3")).await.unwrap(),
            DecrementOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn redelivered_message_applies_once() {
        let repo = InMemoryProductRepository::new();
        repo.seed_if_empty(&seeds()).await.unwrap();

        assert_eq!(
            repo.decrement_stock("456", Some("m-1")).await.unwrap(),
            DecrementOutcome::Decremented { new_stock: 49 }
        );
        assert_eq!(
            repo.decrement_stock("456", Some("m-1")).await.unwrap(),
            DecrementOutcome::AlreadyProcessed
        );
        assert_eq!(
            repo.decrement_stock("456", Some("m-2")).await.unwrap(),
            DecrementOutcome::Decremented { new_stock: 48 }
        );
    }
}
