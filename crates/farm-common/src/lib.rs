pub mod api;
pub mod embedding;
pub mod error;
pub mod gemini;
pub mod redis;
pub mod usage;
