pub mod generations;
pub mod models;
