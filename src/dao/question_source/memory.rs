use std::sync::Arc;

use futures::future::BoxFuture;
use indexmap::IndexMap;
use rand::{rng, seq::SliceRandom};

use crate::dao::{
    models::QuestionEntity, question_source::QuestionSource, storage::StorageResult,
};

/// Question bank held in memory, seeded from the application configuration.
#[derive(Clone, Default)]
pub struct InMemoryQuestionBank {
    questions: Arc<IndexMap<String, QuestionEntity>>,
}

impl InMemoryQuestionBank {
    /// Build a bank from the given questions. Later duplicates of an id replace earlier ones.
    pub fn new(questions: impl IntoIterator<Item = QuestionEntity>) -> Self {
        let questions = questions
            .into_iter()
            .map(|question| (question.id.clone(), question))
            .collect::<IndexMap<_, _>>();
        Self {
            questions: Arc::new(questions),
        }
    }

    fn sample(&self, count: usize) -> Vec<String> {
        let mut ids = self.questions.keys().cloned().collect::<Vec<_>>();
        if ids.len() > 1 {
            ids.shuffle(&mut rng());
        }
        ids.truncate(count);
        ids
    }
}

impl QuestionSource for InMemoryQuestionBank {
    fn sample_questions(&self, count: usize) -> BoxFuture<'static, StorageResult<Vec<String>>> {
        let ids = self.sample(count);
        Box::pin(async move { Ok(ids) })
    }

    fn get_question(&self, id: String) -> BoxFuture<'static, StorageResult<Option<QuestionEntity>>> {
        let question = self.questions.get(&id).cloned();
        Box::pin(async move { Ok(question) })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn bank(size: usize) -> InMemoryQuestionBank {
        InMemoryQuestionBank::new((0..size).map(|i| QuestionEntity {
            id: format!("q{i}"),
            prompt: format!("prompt {i}"),
            expected_answer: format!("answer {i}"),
            category: None,
        }))
    }

    #[tokio::test]
    async fn sampling_is_without_replacement() {
        let ids = bank(25).sample_questions(10).await.unwrap();
        assert_eq!(ids.len(), 10);
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 10);
    }

    #[tokio::test]
    async fn sampling_caps_at_bank_size() {
        assert_eq!(bank(3).sample_questions(10).await.unwrap().len(), 3);
        assert!(bank(0).sample_questions(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_id_is_a_miss() {
        assert!(bank(2).get_question("nope".into()).await.unwrap().is_none());
        assert!(bank(2).get_question("q1".into()).await.unwrap().is_some());
    }
}
