/// Database model definitions.
pub mod models;
/// Trivia question providers.
pub mod question_source;
/// Session document storage and history persistence.
pub mod session_store;
/// Storage abstraction layer for database operations.
pub mod storage;
