use crate::error::GroupingError;
use crate::record::TextRecord;
use crate::vector;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use log::warn;
use rusqlite::{params, Connection, OptionalExtension, Result, Row, Transaction};

pub struct Database {
    conn: Connection,
}

#[derive(Debug, Clone)]
pub struct CourseRecord {
    pub id: i64,
    pub name: String,
}

/// Fields needed to store a new question.
#[derive(Debug, Clone)]
pub struct NewQuestion<'a> {
    pub course_id: i64,
    pub title: &'a str,
    pub body: &'a str,
    pub anonymous: bool,
    pub created_at: DateTime<Utc>,
    pub embedding: Option<&'a [f64]>,
}

pub struct QuestionImportSession<'conn> {
    tx: Transaction<'conn>,
}

impl<'conn> QuestionImportSession<'conn> {
    /// Stores one question and creates its course on first sight. Both
    /// writes share a savepoint: a failed row leaves no course behind.
    pub fn insert(&mut self, question: &NewQuestion<'_>) -> Result<i64> {
        let sp = self.tx.savepoint()?;
        sp.prepare_cached("INSERT OR IGNORE INTO courses (id, name) VALUES (?1, 'Course ' || ?1)")?
            .execute(params![question.course_id])?;

        let embedding = question.embedding.map(encode_embedding).transpose()?;
        sp.prepare_cached(
            "INSERT INTO questions (course_id, title, body, anonymous, created_at, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?
        .execute(params![
            question.course_id,
            question.title,
            question.body,
            question.anonymous,
            format_timestamp(&question.created_at),
            embedding
        ])?;

        let id = sp.last_insert_rowid();
        sp.commit()?;
        Ok(id)
    }

    pub fn commit(self) -> Result<()> {
        self.tx.commit()
    }
}

/// Vectors are stored as a JSON array literal, e.g. `[0.1,0.0,...]`.
/// JSON has no NaN or infinity, so such vectors are refused outright.
fn encode_embedding(vector: &[f64]) -> Result<String> {
    if !vector::is_finite(vector) {
        return Err(rusqlite::Error::ToSqlConversionFailure(Box::new(
            GroupingError::InvalidInput("embedding has non-finite components"),
        )));
    }
    serde_json::to_string(vector).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

/// An unreadable column is treated as missing so the row still loads and the
/// backfill can overwrite it.
fn decode_embedding(question_id: i64, raw: Option<String>) -> Option<Vec<f64>> {
    match raw {
        None => None,
        Some(text) if text.trim().is_empty() => Some(Vec::new()),
        Some(text) => match serde_json::from_str(&text) {
            Ok(vector) => Some(vector),
            Err(e) => {
                warn!(
                    "Ignoring unreadable embedding of question ID {}: {}",
                    question_id, e
                );
                None
            }
        },
    }
}

/// Fixed-width UTC timestamps so that text ordering matches time ordering.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(column: usize, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}

const QUESTION_COLUMNS: &str = "id, course_id, title, body, anonymous, created_at, embedding";

fn question_from_row(row: &Row<'_>) -> Result<TextRecord> {
    let id: i64 = row.get(0)?;
    let created_at: String = row.get(5)?;
    Ok(TextRecord {
        id,
        course_id: row.get(1)?,
        title: row.get(2)?,
        body: row.get(3)?,
        anonymous: row.get(4)?,
        created_at: parse_timestamp(5, &created_at)?,
        embedding: decode_embedding(id, row.get(6)?),
    })
}

impl Database {
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let db = Database { conn };
        db.create_tables()?;
        Ok(db)
    }

    pub fn in_memory() -> Result<Self> {
        Self::new(":memory:")
    }

    fn create_tables(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS courses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS questions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                course_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                anonymous INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                embedding TEXT,
                FOREIGN KEY (course_id) REFERENCES courses(id)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_questions_course ON questions(course_id, created_at)",
            [],
        )?;

        Ok(())
    }

    pub fn insert_course(&self, name: &str) -> Result<i64> {
        self.conn
            .execute("INSERT INTO courses (name) VALUES (?1)", params![name])?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_course(&self, course_id: i64) -> Result<Option<CourseRecord>> {
        self.conn
            .query_row(
                "SELECT id, name FROM courses WHERE id = ?1",
                params![course_id],
                |row| {
                    Ok(CourseRecord {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()
    }

    pub fn get_all_courses(&self) -> Result<Vec<CourseRecord>> {
        let mut stmt = self.conn.prepare("SELECT id, name FROM courses ORDER BY id")?;
        let courses = stmt.query_map([], |row| {
            Ok(CourseRecord {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;
        courses.collect()
    }

    pub fn insert_question(&self, question: &NewQuestion<'_>) -> Result<i64> {
        let embedding = question.embedding.map(encode_embedding).transpose()?;
        self.conn.execute(
            "INSERT INTO questions (course_id, title, body, anonymous, created_at, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                question.course_id,
                question.title,
                question.body,
                question.anonymous,
                format_timestamp(&question.created_at),
                embedding
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn start_question_import(&mut self) -> Result<QuestionImportSession<'_>> {
        let tx = self.conn.transaction()?;
        Ok(QuestionImportSession { tx })
    }

    pub fn get_question(&self, question_id: i64) -> Result<Option<TextRecord>> {
        let sql = format!("SELECT {} FROM questions WHERE id = ?1", QUESTION_COLUMNS);
        self.conn
            .query_row(&sql, params![question_id], question_from_row)
            .optional()
    }

    /// Questions of one course, newest first, ties by ascending id. This is
    /// the order grouping relies on.
    pub fn questions_for_course(&self, course_id: i64) -> Result<Vec<TextRecord>> {
        let sql = format!(
            "SELECT {} FROM questions WHERE course_id = ?1 ORDER BY created_at DESC, id ASC",
            QUESTION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let questions = stmt.query_map(params![course_id], question_from_row)?;
        questions.collect()
    }

    pub fn get_all_questions(&self) -> Result<Vec<TextRecord>> {
        let sql = format!("SELECT {} FROM questions ORDER BY id", QUESTION_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let questions = stmt.query_map([], question_from_row)?;
        questions.collect()
    }

    /// Questions whose embedding is absent, empty or unreadable, by id.
    pub fn questions_missing_embedding(&self) -> Result<Vec<TextRecord>> {
        Ok(self
            .get_all_questions()?
            .into_iter()
            .filter(|q| q.needs_embedding())
            .collect())
    }

    pub fn save_embedding(&self, question_id: i64, embedding: &[f64]) -> Result<()> {
        let encoded = encode_embedding(embedding)?;
        let changed = self.conn.execute(
            "UPDATE questions SET embedding = ?1 WHERE id = ?2",
            params![encoded, question_id],
        )?;
        if changed == 0 {
            return Err(rusqlite::Error::QueryReturnedNoRows);
        }
        Ok(())
    }

    pub fn clear_embeddings(&self) -> Result<()> {
        self.conn
            .execute("UPDATE questions SET embedding = NULL", [])?;
        Ok(())
    }

    pub fn get_question_count(&self) -> Result<usize> {
        self.conn
            .query_row("SELECT COUNT(*) FROM questions", [], |row| row.get(0))
    }

    pub fn get_embedded_question_count(&self) -> Result<usize> {
        let missing = self.questions_missing_embedding()?.len();
        Ok(self.get_question_count()? - missing)
    }

    pub fn delete_question(&self, question_id: i64) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM questions WHERE id = ?1", params![question_id])?;
        Ok(changed > 0)
    }
}
