pub mod client;
pub mod recipe;
pub mod types;

pub use client::VertexHttpClient;
pub use recipe::VertexRecipeClient;
