// Kennel - Core Library
// Exposes the store gateway and input validation for the server binary and tests

pub mod db;
pub mod input;

// Re-export commonly used types
pub use db::{
    count_dogs, find_dog_by_name, get_all_dogs, save_dog, setup_database, Dog,
};
pub use input::{CreateDogInput, NewDog};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
