// Typed request input for dog creation
// Fields arrive as optional strings so presence is checked explicitly before use

use serde::Deserialize;

use crate::db::Dog;

pub const MISSING_FIELDS: &str = "firstname, lastname, breed and age are all required";
pub const INVALID_AGE: &str = "age must be a non-negative integer";

/// Raw POST /dog body before validation
#[derive(Debug, Default, Deserialize)]
pub struct CreateDogInput {
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub breed: Option<String>,
    pub age: Option<String>,
}

/// Validated creation payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDog {
    pub name: String,
    pub breed: String,
    pub age: i64,
}

impl NewDog {
    pub fn into_dog(self) -> Dog {
        Dog::new(self.name, self.breed, self.age)
    }
}

fn required(field: Option<String>) -> Option<String> {
    field
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl CreateDogInput {
    /// Check every required field and build the display name
    /// "<firstname> <lastname>". Blank fields count as missing.
    pub fn validate(self) -> Result<NewDog, &'static str> {
        let firstname = required(self.firstname).ok_or(MISSING_FIELDS)?;
        let lastname = required(self.lastname).ok_or(MISSING_FIELDS)?;
        let breed = required(self.breed).ok_or(MISSING_FIELDS)?;
        let age = required(self.age).ok_or(MISSING_FIELDS)?;

        let age: i64 = age.parse().map_err(|_| INVALID_AGE)?;
        if age < 0 {
            return Err(INVALID_AGE);
        }

        Ok(NewDog {
            name: format!("{} {}", firstname, lastname),
            breed,
            age,
        })
    }
}
