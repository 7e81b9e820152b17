use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Collection,
    bson::{Document, doc},
};
use serde::{Deserialize, Serialize};

use super::{
    error::{MongoDaoError, MongoResult},
    store::MongoInner,
};
use crate::dao::{models::QuestionEntity, question_source::QuestionSource, storage::StorageResult};

const QUESTION_COLLECTION_NAME: &str = "questions";

#[derive(Debug, Serialize, Deserialize)]
struct MongoQuestionDocument {
    id: String,
    question: String,
    answer: String,
    #[serde(default)]
    category: Option<String>,
}

impl From<MongoQuestionDocument> for QuestionEntity {
    fn from(value: MongoQuestionDocument) -> Self {
        Self {
            id: value.id,
            prompt: value.question,
            expected_answer: value.answer,
            category: value.category,
        }
    }
}

/// Question source reading the `questions` collection through a `$sample` aggregation.
#[derive(Clone)]
pub struct MongoQuestionSource {
    inner: Arc<MongoInner>,
}

impl MongoQuestionSource {
    pub(super) fn new(inner: Arc<MongoInner>) -> Self {
        Self { inner }
    }

    async fn collection(&self) -> Collection<MongoQuestionDocument> {
        self.inner
            .database()
            .await
            .collection::<MongoQuestionDocument>(QUESTION_COLLECTION_NAME)
    }

    async fn sample(&self, count: usize) -> MongoResult<Vec<String>> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let pipeline = vec![
            doc! {"$sample": {"size": count as i64}},
            doc! {"$project": {"_id": 0, "id": 1}},
        ];
        let documents: Vec<Document> = self
            .collection()
            .await
            .aggregate(pipeline)
            .await
            .map_err(|source| MongoDaoError::SampleQuestions { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::SampleQuestions { source })?;

        // `$sample` may repeat a document on large collections.
        let mut ids: Vec<String> = Vec::with_capacity(documents.len());
        for id in documents
            .iter()
            .filter_map(|document| document.get_str("id").ok())
        {
            if !ids.iter().any(|known| known == id) {
                ids.push(id.to_owned());
            }
        }
        Ok(ids)
    }

    async fn find(&self, id: String) -> MongoResult<Option<QuestionEntity>> {
        let document = self
            .collection()
            .await
            .find_one(doc! {"id": &id})
            .await
            .map_err(|source| MongoDaoError::LoadQuestion { id, source })?;
        Ok(document.map(Into::into))
    }
}

impl QuestionSource for MongoQuestionSource {
    fn sample_questions(&self, count: usize) -> BoxFuture<'static, StorageResult<Vec<String>>> {
        let source = self.clone();
        Box::pin(async move { source.sample(count).await.map_err(Into::into) })
    }

    fn get_question(&self, id: String) -> BoxFuture<'static, StorageResult<Option<QuestionEntity>>> {
        let source = self.clone();
        Box::pin(async move { source.find(id).await.map_err(Into::into) })
    }
}
