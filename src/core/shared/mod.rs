pub mod models;
pub mod schema;
pub mod state;
pub mod utils;
