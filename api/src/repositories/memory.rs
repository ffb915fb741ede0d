use std::collections::BTreeMap;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domains::{NewPerson, Person, PersonUpdate};

use super::{parse_id, PeopleRepository, StoreResult};

/// Process-local store. Ids are v7 UUIDs, so iteration roughly follows
/// insertion time.
#[derive(Default)]
pub struct MemoryPeopleRepository {
    people: RwLock<BTreeMap<Uuid, Person>>,
}

impl MemoryPeopleRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PeopleRepository for MemoryPeopleRepository {
    async fn insert(&self, person: NewPerson) -> StoreResult<Person> {
        person.validate()?;

        let person = person.into_person(Uuid::now_v7());
        self.people.write().await.insert(person.id, person.clone());

        Ok(person)
    }

    async fn list_all(&self) -> StoreResult<Vec<Person>> {
        Ok(self.people.read().await.values().cloned().collect())
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<Person>> {
        let id = parse_id(id)?;
        Ok(self.people.read().await.get(&id).cloned())
    }

    async fn update_by_id(&self, id: &str, update: PersonUpdate) -> StoreResult<Option<Person>> {
        let id = parse_id(id)?;

        let mut people = self.people.write().await;
        let Some(person) = people.get_mut(&id) else {
            return Ok(None);
        };

        person.name = update.name;
        person.number = update.number;

        Ok(Some(person.clone()))
    }

    async fn delete_by_id(&self, id: &str) -> StoreResult<()> {
        let id = parse_id(id)?;
        self.people.write().await.remove(&id);

        Ok(())
    }

    async fn count(&self) -> StoreResult<u64> {
        Ok(self.people.read().await.len() as u64)
    }

    async fn close(&self) {}
}
