pub mod cli;
pub mod fetch;
pub mod llm;
pub mod load_config;
