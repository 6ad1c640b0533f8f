use crate::backfill::{make_logging_progress_callback, BackfillReport, Backfiller};
use crate::config::Settings;
use crate::database::{Database, NewQuestion};
use crate::error::ServiceError;
use crate::grouping::{
    group_by_similarity, validate_threshold, SimilarityGroup, STRICT_GROUPING_THRESHOLD,
};
use crate::record::TextRecord;
use crate::vector::check_embedding;
use crate::vectorizer::TextEmbedder;
use chrono::Utc;
use log::{debug, error, info, warn};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct SimilarQuestion {
    pub question: TextRecord,
    pub similarity_score: f64,
}

/// Owned, serializable form of a [`SimilarityGroup`].
#[derive(Debug, Clone, Serialize)]
pub struct QuestionGroup {
    pub main_question: TextRecord,
    pub similar_questions: Vec<SimilarQuestion>,
    pub total_similar: usize,
}

impl From<&SimilarityGroup<'_>> for QuestionGroup {
    fn from(group: &SimilarityGroup<'_>) -> Self {
        let similar_questions: Vec<SimilarQuestion> = group
            .members
            .iter()
            .map(|member| SimilarQuestion {
                question: member.record.clone(),
                similarity_score: member.score,
            })
            .collect();

        QuestionGroup {
            main_question: group.leader.clone(),
            total_similar: similar_questions.len(),
            similar_questions,
        }
    }
}

/// Question operations that involve embeddings: creation, grouping and the
/// startup backfill. Everything embedding-related is a no-op unless the
/// feature flag is on.
pub struct QuestionService {
    db: Database,
    embedder: Box<dyn TextEmbedder>,
    ai_enabled: bool,
    backfill_chunk: usize,
}

impl QuestionService {
    pub fn new(db: Database, embedder: Box<dyn TextEmbedder>, settings: &Settings) -> Self {
        QuestionService {
            db,
            embedder,
            ai_enabled: settings.ai_enabled,
            backfill_chunk: settings.backfill_chunk,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut Database {
        &mut self.db
    }

    pub fn embedder(&self) -> &dyn TextEmbedder {
        self.embedder.as_ref()
    }

    pub fn ai_enabled(&self) -> bool {
        self.ai_enabled
    }

    /// Stores a question, embedding `title + " " + body` first when enabled.
    /// An unusable embedding is dropped with an error log; the question is
    /// stored regardless and left for the backfill.
    pub fn create_question(
        &self,
        course_id: i64,
        title: &str,
        body: &str,
        anonymous: bool,
    ) -> Result<TextRecord, ServiceError> {
        info!("Creating question: {} in course {}", title, course_id);

        if title.trim().is_empty() {
            return Err(ServiceError::Validation("Question title is required".to_string()));
        }
        if self.db.get_course(course_id)?.is_none() {
            return Err(ServiceError::CourseNotFound(course_id));
        }

        let embedding = if self.ai_enabled {
            let text = format!("{} {}", title, body);
            debug!(
                "AI mode enabled - generating embedding for combined text ({} chars)",
                text.len()
            );
            let vector = self.embedder.embed(&text);
            match check_embedding(&vector, self.embedder.dimension()) {
                Ok(()) => {
                    info!("Embedding generated with {} dimensions", vector.len());
                    Some(vector)
                }
                Err(e) => {
                    error!(
                        "Embedder {} produced an unusable embedding ({}); storing without embedding",
                        self.embedder.name(),
                        e
                    );
                    None
                }
            }
        } else {
            debug!("AI mode disabled - skipping embedding generation");
            None
        };

        let id = self.db.insert_question(&NewQuestion {
            course_id,
            title,
            body,
            anonymous,
            created_at: Utc::now(),
            embedding: embedding.as_deref(),
        })?;
        info!("Question saved with ID: {}", id);

        self.db
            .get_question(id)?
            .ok_or(ServiceError::QuestionNotFound(id))
    }

    pub fn questions_by_course(&self, course_id: i64) -> Result<Vec<TextRecord>, ServiceError> {
        Ok(self.db.questions_for_course(course_id)?)
    }

    pub fn delete_question(&self, question_id: i64) -> Result<(), ServiceError> {
        if self.db.delete_question(question_id)? {
            info!("Question ID: {} deleted", question_id);
            Ok(())
        } else {
            Err(ServiceError::QuestionNotFound(question_id))
        }
    }

    /// Groups a course's questions, newest first. The threshold is checked
    /// before anything is loaded.
    pub fn grouped_questions(
        &self,
        course_id: i64,
        threshold: f64,
    ) -> Result<Vec<QuestionGroup>, ServiceError> {
        let threshold = validate_threshold(threshold)?;
        info!(
            "Grouping questions for course ID: {} with threshold: {}",
            course_id, threshold
        );

        if !self.ai_enabled {
            warn!("AI mode disabled - cannot group questions without embeddings");
            return Ok(Vec::new());
        }

        let dimension = self.embedder.dimension();
        let mut questions = self.db.questions_for_course(course_id)?;
        for question in questions.iter_mut() {
            let unusable = match question.usable_embedding() {
                Some(vector) => check_embedding(vector, dimension).err(),
                None => None,
            };
            if let Some(e) = unusable {
                warn!(
                    "Leaving question ID {} out of grouping: {}",
                    question.id, e
                );
                question.embedding = None;
            }
        }

        let groups = group_by_similarity(&questions, threshold);
        Ok(groups.iter().map(QuestionGroup::from).collect())
    }

    /// Same as [`Self::grouped_questions`] with the strict default threshold.
    pub fn grouped_questions_default(
        &self,
        course_id: i64,
    ) -> Result<Vec<QuestionGroup>, ServiceError> {
        self.grouped_questions(course_id, STRICT_GROUPING_THRESHOLD)
    }

    /// Fills in embeddings for stored questions that lack one. Never fails:
    /// storage problems are logged and `None` is returned so the caller can
    /// keep running.
    pub fn run_startup_backfill(&self) -> Option<BackfillReport> {
        if !self.ai_enabled {
            info!("AI mode disabled - skipping embedding backfill");
            return None;
        }

        info!("Starting embedding backfill migration...");
        let mut backfiller =
            Backfiller::new(self.embedder.as_ref()).with_chunk_size(self.backfill_chunk);
        backfiller.set_progress_handle(make_logging_progress_callback("Embedding backfill"));

        match backfiller.backfill_database(&self.db) {
            Ok(report) => Some(report),
            Err(e) => {
                error!("Embedding backfill migration failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GroupingError;
    use crate::vectorizer::HashingEmbedder;

    fn service(ai_enabled: bool) -> (QuestionService, i64) {
        let db = Database::in_memory().unwrap();
        let course = db.insert_course("Object-oriented design").unwrap();
        let settings = Settings {
            ai_enabled,
            ..Settings::default()
        };
        (
            QuestionService::new(db, Box::new(HashingEmbedder::new()), &settings),
            course,
        )
    }

    #[test]
    fn created_questions_carry_embeddings_when_enabled() {
        let (svc, course) = service(true);
        let q = svc
            .create_question(course, "Inheritance basics", "", false)
            .unwrap();
        assert_eq!(q.embedding.map(|v| v.len()), Some(1536));

        let (svc, course) = service(false);
        let q = svc
            .create_question(course, "Inheritance basics", "", false)
            .unwrap();
        assert!(q.embedding.is_none());
    }

    #[test]
    fn create_rejects_unknown_course_and_empty_title() {
        let (svc, course) = service(true);
        assert!(matches!(
            svc.create_question(course + 100, "Title", "", false),
            Err(ServiceError::CourseNotFound(_))
        ));
        assert!(matches!(
            svc.create_question(course, "  ", "", false),
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn grouping_validates_threshold_first() {
        let (svc, course) = service(true);
        for bad in [-0.1, 1.1] {
            assert!(matches!(
                svc.grouped_questions(course, bad),
                Err(ServiceError::Grouping(GroupingError::ThresholdOutOfRange(_)))
            ));
        }
    }

    #[test]
    fn grouping_is_empty_when_disabled() {
        let (svc, course) = service(false);
        svc.create_question(course, "Inheritance basics", "", false)
            .unwrap();
        assert!(svc.grouped_questions(course, 0.1).unwrap().is_empty());
    }

    #[test]
    fn groups_similar_questions_of_a_course() {
        let (svc, course) = service(true);
        let basics = svc
            .create_question(course, "Inheritance basics", "", false)
            .unwrap();
        let oop = svc
            .create_question(course, "Explain inheritance in OOP", "", false)
            .unwrap();
        svc.create_question(course, "Polymorphism examples", "", false)
            .unwrap();

        let groups = svc.grouped_questions(course, 0.1).unwrap();

        assert_eq!(groups.len(), 2);
        let inheritance = groups
            .iter()
            .find(|g| g.total_similar == 1)
            .expect("inheritance group");
        let mut ids = vec![
            inheritance.main_question.id,
            inheritance.similar_questions[0].question.id,
        ];
        ids.sort_unstable();
        assert_eq!(ids, vec![basics.id, oop.id]);
        assert!(groups.iter().any(|g| g.total_similar == 0
            && g.main_question.title == "Polymorphism examples"));
    }

    #[test]
    fn startup_backfill_respects_flag() {
        let (disabled, course) = service(false);
        disabled
            .create_question(course, "Inheritance basics", "", false)
            .unwrap();
        assert!(disabled.run_startup_backfill().is_none());

        let settings = Settings {
            ai_enabled: true,
            ..Settings::default()
        };
        let QuestionService { db, .. } = disabled;
        let enabled = QuestionService::new(db, Box::new(HashingEmbedder::new()), &settings);

        let report = enabled.run_startup_backfill().unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(enabled.run_startup_backfill().unwrap().candidates, 0);
    }

    /// Hashing embedder that yields NaN for texts mentioning "broken".
    struct NanEmbedder(HashingEmbedder);

    impl TextEmbedder for NanEmbedder {
        fn name(&self) -> &'static str {
            "nan"
        }

        fn dimension(&self) -> usize {
            self.0.dimension()
        }

        fn embed(&self, text: &str) -> Vec<f64> {
            let mut vector = self.0.embed(text);
            if text.contains("broken") {
                vector[0] = f64::NAN;
            }
            vector
        }
    }

    #[test]
    fn non_finite_embedding_does_not_break_create_group_or_backfill() {
        let db = Database::in_memory().unwrap();
        let course = db.insert_course("Object-oriented design").unwrap();
        let settings = Settings {
            ai_enabled: true,
            ..Settings::default()
        };
        let svc = QuestionService::new(
            db,
            Box::new(NanEmbedder(HashingEmbedder::new())),
            &settings,
        );

        let broken = svc
            .create_question(course, "Inheritance is broken", "", false)
            .unwrap();
        assert!(broken.embedding.is_none());
        svc.create_question(course, "Inheritance basics", "", false)
            .unwrap();
        svc.create_question(course, "Explain inheritance in OOP", "", false)
            .unwrap();

        let groups = svc.grouped_questions(course, 0.1).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].total_similar, 1);
        assert!(groups
            .iter()
            .all(|g| g.main_question.id != broken.id
                && g.similar_questions.iter().all(|m| m.question.id != broken.id)));

        let report = svc.run_startup_backfill().unwrap();
        assert_eq!(report.candidates, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(svc.db().questions_missing_embedding().unwrap().len(), 1);
    }

    #[test]
    fn stored_vectors_of_the_wrong_dimension_are_left_out() {
        let (svc, course) = service(true);
        let a = svc
            .create_question(course, "Inheritance basics", "", false)
            .unwrap();
        let b = svc
            .create_question(course, "Explain inheritance in OOP", "", false)
            .unwrap();
        svc.db().save_embedding(a.id, &[1.0; 768]).unwrap();
        svc.db().save_embedding(b.id, &[1.0; 768]).unwrap();

        assert!(svc.grouped_questions(course, 0.1).unwrap().is_empty());
    }

    #[test]
    fn groups_serialize_without_embeddings() {
        let (svc, course) = service(true);
        svc.create_question(course, "Inheritance basics", "", false)
            .unwrap();
        let groups = svc.grouped_questions_default(course).unwrap();

        let json = serde_json::to_value(&groups).unwrap();
        assert_eq!(json[0]["total_similar"], 0);
        assert!(json[0]["main_question"].get("embedding").is_none());
    }
}
