pub mod chrome;
pub mod composer;
pub mod generator;
pub mod output;
pub mod postprocess;
pub mod rasterizer;
pub mod registry;
pub mod resources;
pub mod tools;
pub mod validator;
