use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use crate::domains::{NewPerson, Person, PersonUpdate};

use super::{parse_id, PeopleRepository, StoreResult};

const CREATE_TABLE: &str = "\
CREATE TABLE IF NOT EXISTS persons ( \
    id UUID PRIMARY KEY, \
    name TEXT NOT NULL, \
    number TEXT NOT NULL \
)\
";

#[derive(Clone)]
pub struct SqlPeopleRepository {
    pub(super) pool: PgPool,
}

impl SqlPeopleRepository {
    /// Opens a pool against `addr` and makes sure the `persons` table exists.
    pub async fn connect(addr: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new().connect(addr).await?;
        sqlx::query(CREATE_TABLE).execute(&pool).await?;

        tracing::debug!(target: "store", "connected to postgres");
        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl PeopleRepository for SqlPeopleRepository {
    async fn insert(&self, person: NewPerson) -> StoreResult<Person> {
        person.validate()?;

        sqlx::query_as(
            "\
INSERT INTO persons (id, name, number) \
VALUES ($1, $2, $3) \
RETURNING id, name, number\
",
        )
        .bind(Uuid::now_v7())
        .bind(&person.name)
        .bind(&person.number)
        .fetch_one(&self.pool)
        .await
        .map_err(Into::into)
    }

    async fn list_all(&self) -> StoreResult<Vec<Person>> {
        sqlx::query_as("SELECT id, name, number FROM persons")
            .fetch_all(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Person>> {
        let id = parse_id(id)?;

        sqlx::query_as("SELECT id, name, number FROM persons WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn update_by_id(&self, id: &str, update: PersonUpdate) -> StoreResult<Option<Person>> {
        let id = parse_id(id)?;

        sqlx::query_as(
            "\
UPDATE persons \
SET name = $2, number = $3 \
WHERE id = $1 \
RETURNING id, name, number\
",
        )
        .bind(id)
        .bind(&update.name)
        .bind(&update.number)
        .fetch_optional(&self.pool)
        .await
        .map_err(Into::into)
    }

    async fn delete_by_id(&self, id: &str) -> StoreResult<()> {
        let id = parse_id(id)?;

        sqlx::query("DELETE FROM persons WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn count(&self) -> StoreResult<u64> {
        let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(1) FROM persons")
            .fetch_one(&self.pool)
            .await?;

        Ok(rows.try_into().unwrap_or_default())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
