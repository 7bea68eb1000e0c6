pub mod config;
pub mod engine;
pub mod errors;
pub mod llm;
pub mod research;
pub mod ui;
pub mod util;
