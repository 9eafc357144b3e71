pub mod resources;
pub mod tools;
