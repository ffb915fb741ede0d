use std::{fmt, hash::Hash};

use uuid::Uuid;

use crate::error::StoreError;

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize, sqlx::FromRow)]
pub struct Person {
    pub id: Uuid,
    pub name: String,
    pub number: String,
}

impl fmt::Display for Person {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.number)
    }
}

impl Hash for Person {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Eq for Person {}

impl PartialEq for Person {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// Field values for a person that has not been stored yet.
#[derive(Clone, Debug, Default)]
pub struct NewPerson {
    pub name: String,
    pub number: String,
}

type FieldAccessor = fn(&NewPerson) -> &str;

impl NewPerson {
    /// Fields that must be present and non-empty for an insert to go through.
    const REQUIRED: [(&'static str, FieldAccessor); 2] =
        [("name", |p| p.name.as_str()), ("number", |p| p.number.as_str())];

    pub fn new(name: impl Into<String>, number: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            number: number.into(),
        }
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        let violations: Vec<_> = Self::REQUIRED
            .iter()
            .filter(|(_, field)| field(self).is_empty())
            .map(|(name, _)| format!("{name}: Path `{name}` is required."))
            .collect();

        if violations.is_empty() {
            return Ok(());
        }

        Err(StoreError::Validation(format!(
            "Person validation failed: {}",
            violations.join(", ")
        )))
    }

    pub(crate) fn into_person(self, id: Uuid) -> Person {
        Person {
            id,
            name: self.name,
            number: self.number,
        }
    }
}

/// Replacement values for an existing person. Updates overwrite both fields
/// and are not validated.
#[derive(Clone, Debug, Default)]
pub struct PersonUpdate {
    pub name: String,
    pub number: String,
}
