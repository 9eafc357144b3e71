pub mod common;
pub mod tools;
