pub mod client;
pub mod value;

pub use client::FirestoreClient;
