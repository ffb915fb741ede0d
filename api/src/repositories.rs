pub mod memory;
pub mod sql;

use uuid::Uuid;

use crate::{
    domains::{NewPerson, Person, PersonUpdate},
    error::StoreError,
};

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait::async_trait]
pub trait PeopleRepository {
    /// Validates and stores a new person under a freshly generated id.
    async fn insert(&self, person: NewPerson) -> StoreResult<Person>;
    async fn list_all(&self) -> StoreResult<Vec<Person>>;
    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Person>>;
    /// Replaces both fields, returning the stored result or `None` when no
    /// person has that id.
    async fn update_by_id(&self, id: &str, update: PersonUpdate) -> StoreResult<Option<Person>>;
    /// Succeeds whether or not a person with that id existed.
    async fn delete_by_id(&self, id: &str) -> StoreResult<()>;
    async fn count(&self) -> StoreResult<u64>;
    async fn close(&self);
}

/// Parses an identifier as handed in by a caller, rejecting anything that is
/// not a hyphenated or simple UUID.
pub fn parse_id(id: &str) -> StoreResult<Uuid> {
    id.parse()
        .map_err(|_| StoreError::MalformedId(id.to_string()))
}
