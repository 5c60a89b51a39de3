use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use sqlx::{query, query_as, query_scalar, PgPool, Postgres, Transaction};
use thiserror::Error;
use tracing::{info, warn};

use crate::drink::{Drink, Ingredient, Recipe, RecipeError};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("drink {0} no longer exists")]
    Missing(i32),
    #[error("in-memory drink table lock poisoned")]
    Poisoned,
    #[error(transparent)]
    Recipe(#[from] RecipeError),
}

/// Persistence for drink rows. Writes are all-or-nothing: a failed write leaves the table as it was.
#[async_trait]
pub trait DrinkRepository: Send + Sync {
    async fn list_all(&self) -> Result<Vec<Drink>, StorageError>;
    async fn find_by_id(&self, id: i32) -> Result<Option<Drink>, StorageError>;
    async fn find_by_title(&self, title: &str) -> Result<Vec<Drink>, StorageError>;
    /// Returns the id assigned by the store.
    async fn insert(&self, title: &str, encoded_recipe: &str) -> Result<i32, StorageError>;
    async fn update(&self, drink: &Drink) -> Result<(), StorageError>;
    async fn delete(&self, drink: &Drink) -> Result<(), StorageError>;
}

#[derive(Clone)]
pub struct PgDrinkRepository {
    pool: PgPool,
}

impl PgDrinkRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Ensure database schema is up to date before serving traffic.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

async fn rollback(tx: Transaction<'_, Postgres>, err: StorageError) -> StorageError {
    if let Err(rollback_err) = tx.rollback().await {
        warn!(error = %rollback_err, "drink transaction rollback failed");
    }
    err
}

#[async_trait]
impl DrinkRepository for PgDrinkRepository {
    async fn list_all(&self) -> Result<Vec<Drink>, StorageError> {
        let drinks = query_as::<_, Drink>("SELECT id, title, recipe FROM drinks ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(drinks)
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<Drink>, StorageError> {
        let drink = query_as::<_, Drink>("SELECT id, title, recipe FROM drinks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(drink)
    }

    async fn find_by_title(&self, title: &str) -> Result<Vec<Drink>, StorageError> {
        let drinks = query_as::<_, Drink>(
            "SELECT id, title, recipe FROM drinks WHERE title = $1 ORDER BY id",
        )
        .bind(title)
        .fetch_all(&self.pool)
        .await?;
        Ok(drinks)
    }

    async fn insert(&self, title: &str, encoded_recipe: &str) -> Result<i32, StorageError> {
        let mut tx = self.pool.begin().await?;
        let inserted = query_scalar::<_, i32>(
            "INSERT INTO drinks (title, recipe) VALUES ($1, $2) RETURNING id",
        )
        .bind(title)
        .bind(encoded_recipe)
        .fetch_one(&mut *tx)
        .await;
        let id = match inserted {
            Ok(id) => id,
            Err(err) => return Err(rollback(tx, err.into()).await),
        };
        tx.commit().await?;
        Ok(id)
    }

    async fn update(&self, drink: &Drink) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        let result = query("UPDATE drinks SET title = $1, recipe = $2 WHERE id = $3")
            .bind(&drink.title)
            .bind(&drink.recipe)
            .bind(drink.id)
            .execute(&mut *tx)
            .await;
        match result {
            Ok(done) if done.rows_affected() == 0 => {
                return Err(rollback(tx, StorageError::Missing(drink.id)).await)
            }
            Ok(_) => {}
            Err(err) => return Err(rollback(tx, err.into()).await),
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, drink: &Drink) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        let result = query("DELETE FROM drinks WHERE id = $1")
            .bind(drink.id)
            .execute(&mut *tx)
            .await;
        match result {
            Ok(done) if done.rows_affected() == 0 => {
                return Err(rollback(tx, StorageError::Missing(drink.id)).await)
            }
            Ok(_) => {}
            Err(err) => return Err(rollback(tx, err.into()).await),
        }
        tx.commit().await?;
        Ok(())
    }
}

#[derive(Default)]
struct DrinkTable {
    rows: BTreeMap<i32, Drink>,
    last_id: i32,
}

/// Process-local store for development and tests. Each write happens under one lock, so it is atomic.
#[derive(Clone, Default)]
pub struct InMemoryDrinkRepository {
    inner: Arc<RwLock<DrinkTable>>,
}

impl InMemoryDrinkRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DrinkRepository for InMemoryDrinkRepository {
    async fn list_all(&self) -> Result<Vec<Drink>, StorageError> {
        let table = self.inner.read().map_err(|_| StorageError::Poisoned)?;
        Ok(table.rows.values().cloned().collect())
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<Drink>, StorageError> {
        let table = self.inner.read().map_err(|_| StorageError::Poisoned)?;
        Ok(table.rows.get(&id).cloned())
    }

    async fn find_by_title(&self, title: &str) -> Result<Vec<Drink>, StorageError> {
        let table = self.inner.read().map_err(|_| StorageError::Poisoned)?;
        Ok(table.rows.values().filter(|drink| drink.title == title).cloned().collect())
    }

    async fn insert(&self, title: &str, encoded_recipe: &str) -> Result<i32, StorageError> {
        let mut table = self.inner.write().map_err(|_| StorageError::Poisoned)?;
        table.last_id += 1;
        let id = table.last_id;
        table.rows.insert(
            id,
            Drink { id, title: title.to_string(), recipe: encoded_recipe.to_string() },
        );
        Ok(id)
    }

    async fn update(&self, drink: &Drink) -> Result<(), StorageError> {
        let mut table = self.inner.write().map_err(|_| StorageError::Poisoned)?;
        match table.rows.get_mut(&drink.id) {
            Some(row) => {
                *row = drink.clone();
                Ok(())
            }
            None => Err(StorageError::Missing(drink.id)),
        }
    }

    async fn delete(&self, drink: &Drink) -> Result<(), StorageError> {
        let mut table = self.inner.write().map_err(|_| StorageError::Poisoned)?;
        table
            .rows
            .remove(&drink.id)
            .map(|_| ())
            .ok_or(StorageError::Missing(drink.id))
    }
}

/// Inserts the starter drink when the table is empty. Returns whether a row was written.
pub async fn seed_if_empty(repo: &dyn DrinkRepository) -> Result<bool, StorageError> {
    if !repo.list_all().await?.is_empty() {
        return Ok(false);
    }
    let recipe = Recipe(vec![Ingredient {
        name: "water".into(),
        color: "blue".into(),
        parts: 1,
    }]);
    let id = repo.insert("water", &recipe.encode()?).await?;
    info!(drink_id = id, "seeded empty drink table");
    Ok(true)
}
