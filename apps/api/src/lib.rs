pub mod config;
pub mod db;
pub mod errors;
pub mod layout;
pub mod llm_client;
pub mod proposal;
pub mod routes;
pub mod state;
