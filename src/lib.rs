pub mod config;
pub mod error;
pub mod gemini;
pub mod github;
pub mod imaging;
pub mod models;
pub mod orchestrator;
pub mod routes;
pub mod session;
pub mod studio;
pub mod transform;

#[cfg(test)]
mod testing;
