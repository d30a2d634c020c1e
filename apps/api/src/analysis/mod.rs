pub mod handlers;
pub mod models;
pub mod orchestrator;
pub mod prompts;
pub mod records;
pub mod renderer;
