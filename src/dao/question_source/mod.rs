pub mod memory;

use futures::future::BoxFuture;

use crate::dao::{models::QuestionEntity, storage::StorageResult};

/// Read-only provider of trivia questions.
pub trait QuestionSource: Send + Sync {
    /// Draw up to `count` distinct question ids at random. An empty result is not an error.
    fn sample_questions(&self, count: usize) -> BoxFuture<'static, StorageResult<Vec<String>>>;
    /// Fetch a question by id; a miss returns `None`.
    fn get_question(&self, id: String) -> BoxFuture<'static, StorageResult<Option<QuestionEntity>>>;
}
