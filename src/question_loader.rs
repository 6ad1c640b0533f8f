use crate::database::{Database, NewQuestion};
use crate::vector::check_embedding;
use crate::vectorizer::TextEmbedder;
use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, StringRecord};
use log::warn;
use std::fs::File;
use std::io::Read;

#[derive(Debug, Clone)]
pub struct QuestionLoadReport {
    pub processed: usize,
    pub inserted: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

struct Columns {
    course_id: usize,
    title: usize,
    body: Option<usize>,
    created_at: Option<usize>,
    anonymous: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> Result<Self, String> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };

        Ok(Columns {
            course_id: find("course_id")
                .ok_or_else(|| "CSV file must contain a 'course_id' column".to_string())?,
            title: find("title")
                .ok_or_else(|| "CSV file must contain a 'title' column".to_string())?,
            body: find("body").or_else(|| find("content")),
            created_at: find("created_at"),
            anonymous: find("anonymous"),
        })
    }
}

struct ParsedRow {
    course_id: i64,
    title: String,
    body: String,
    created_at: DateTime<Utc>,
    anonymous: bool,
}

fn parse_row(record: &StringRecord, columns: &Columns) -> Result<ParsedRow, String> {
    let field = |idx: Option<usize>| idx.and_then(|i| record.get(i)).map(str::trim);

    let course_id = field(Some(columns.course_id))
        .ok_or_else(|| "Missing course_id column".to_string())?
        .parse::<i64>()
        .map_err(|e| format!("Invalid course_id: {}", e))?;

    let title = field(Some(columns.title)).unwrap_or_default();
    if title.is_empty() {
        return Err("Empty title value".to_string());
    }

    let created_at = match field(columns.created_at).filter(|v| !v.is_empty()) {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| format!("Invalid created_at '{}': {}", raw, e))?,
        None => Utc::now(),
    };

    let anonymous = match field(columns.anonymous).map(str::to_ascii_lowercase) {
        None => false,
        Some(v) => matches!(v.as_str(), "1" | "true" | "yes"),
    };

    Ok(ParsedRow {
        course_id,
        title: title.to_string(),
        body: field(columns.body).unwrap_or_default().to_string(),
        created_at,
        anonymous,
    })
}

/// Unusable embedder output is dropped so the row still imports and the
/// backfill picks it up later.
fn embed_row(embedder: &dyn TextEmbedder, row: &ParsedRow, line: usize) -> Option<Vec<f64>> {
    let vector = if row.body.is_empty() {
        embedder.embed(&row.title)
    } else {
        embedder.embed(&format!("{} {}", row.title, row.body))
    };
    match check_embedding(&vector, embedder.dimension()) {
        Ok(()) => Some(vector),
        Err(e) => {
            warn!("Line {}: importing without embedding: {}", line, e);
            None
        }
    }
}

pub struct QuestionLoader<'e> {
    embedder: Option<&'e dyn TextEmbedder>,
}

impl<'e> QuestionLoader<'e> {
    pub fn new() -> Self {
        QuestionLoader { embedder: None }
    }

    /// Imported questions get their embedding computed on the way in.
    pub fn with_embedder(embedder: &'e dyn TextEmbedder) -> Self {
        QuestionLoader {
            embedder: Some(embedder),
        }
    }

    pub fn load_from_csv(
        &self,
        csv_path: &str,
        db: &mut Database,
    ) -> Result<QuestionLoadReport, String> {
        let file = File::open(csv_path).map_err(|e| format!("Failed to open CSV file: {}", e))?;
        self.load_from_reader(file, db)
    }

    /// Expects headers `course_id` and `title`; `body` (or `content`),
    /// `created_at` (RFC 3339) and `anonymous` are optional.
    pub fn load_from_reader<R: Read>(
        &self,
        input: R,
        db: &mut Database,
    ) -> Result<QuestionLoadReport, String> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(input);

        let headers = reader
            .headers()
            .map_err(|e| format!("Failed to read CSV headers: {}", e))?;
        let columns = Columns::from_headers(headers)?;

        let mut processed = 0;
        let mut inserted = 0;
        let mut skipped = 0;
        let mut errors = Vec::new();

        let mut record = StringRecord::new();
        let mut line_index = 0usize;
        let mut session = db
            .start_question_import()
            .map_err(|e| format!("Failed to start question import transaction: {}", e))?;

        loop {
            let display_line = line_index + 2;
            match reader.read_record(&mut record) {
                Ok(true) => {
                    processed += 1;
                    match parse_row(&record, &columns) {
                        Ok(row) => {
                            let embedding = self
                                .embedder
                                .and_then(|embedder| embed_row(embedder, &row, display_line));
                            let question = NewQuestion {
                                course_id: row.course_id,
                                title: &row.title,
                                body: &row.body,
                                anonymous: row.anonymous,
                                created_at: row.created_at,
                                embedding: embedding.as_deref(),
                            };
                            match session.insert(&question) {
                                Ok(_) => inserted += 1,
                                Err(e) => {
                                    skipped += 1;
                                    errors.push(format!("Line {}: {}", display_line, e));
                                }
                            }
                        }
                        Err(e) => {
                            skipped += 1;
                            errors.push(format!("Line {}: {}", display_line, e));
                        }
                    }
                }
                Ok(false) => break,
                Err(e) => {
                    processed += 1;
                    skipped += 1;
                    errors.push(format!("Line {}: {}", display_line, e));
                }
            }
            line_index += 1;
        }

        if processed == 0 {
            drop(session);
            return Err("CSV file did not contain any records".to_string());
        }

        session
            .commit()
            .map_err(|e| format!("Failed to commit questions: {}", e))?;

        Ok(QuestionLoadReport {
            processed,
            inserted,
            skipped,
            errors,
        })
    }
}

impl Default for QuestionLoader<'_> {
    fn default() -> Self {
        Self::new()
    }
}
