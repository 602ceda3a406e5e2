pub mod auth;
pub mod batches;
pub mod chat;
pub mod core;
pub mod feedback;
pub mod interns;
pub mod reports;
pub mod scores;
pub mod sheets;
pub mod subjects;
