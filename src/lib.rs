//! Recipe generator for photographed dishes
//!
//! Receives a Cloud Storage reference to a dish photo, asks Gemini on Vertex
//! AI for a structured recipe, and stores it in Firestore unless a recipe
//! with the same name is already there.

pub mod ai;
pub mod app;
pub mod auth;
pub mod error;
pub mod gcs;
pub mod handler;
pub mod models;
pub mod prompts;
pub mod store;

pub use error::{Error, Result};
