use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use question_grouper::config::{Settings, AI_ENABLED_VAR, DB_PATH_VAR};
use question_grouper::database::Database;
use question_grouper::grouping::{DEFAULT_GROUPING_THRESHOLD, STRICT_GROUPING_THRESHOLD};
use question_grouper::normalizer;
use question_grouper::question_loader::QuestionLoader;
use question_grouper::service::QuestionService;
use question_grouper::vector::{cosine_similarity, euclidean_distance};
use question_grouper::vectorizer::{HashingEmbedder, TextEmbedder};

/// Groups near-duplicate course questions using hashed text embeddings.
#[derive(Parser, Debug)]
#[command(name = "qgroup", version)]
struct Cli {
    /// SQLite database holding courses and questions.
    #[arg(long, env = DB_PATH_VAR)]
    db: Option<String>,

    /// Enable embedding generation, backfill and grouping.
    #[arg(long)]
    ai: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Import questions from a CSV file (course_id,title[,body,created_at,anonymous]).
    Import { csv: String },
    /// Create a course and print its id.
    AddCourse { name: String },
    /// Store a new question.
    Ask {
        #[arg(long)]
        course: i64,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        body: String,
        #[arg(long)]
        anonymous: bool,
    },
    /// Compute embeddings for questions that have none.
    Backfill,
    /// Print the similarity groups of a course as JSON.
    Group {
        #[arg(long)]
        course: i64,
        /// Minimum cosine similarity, 0.0 to 1.0.
        #[arg(long)]
        threshold: Option<f64>,
        /// Use the strict default threshold instead of the surface default.
        #[arg(long, conflicts_with = "threshold")]
        strict: bool,
    },
    /// Show the extracted terms and embedding summary of a text.
    Embed { text: String },
    /// Compare two texts.
    Similarity { first: String, second: String },
}

fn main() -> Result<()> {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();

    let cli = Cli::parse();
    let mut settings = Settings::from_env();
    if let Some(db) = cli.db {
        settings.db_path = db;
    }
    if cli.ai {
        settings.ai_enabled = true;
    }

    match cli.command {
        Commands::Embed { text } => print_embedding(&text)?,
        Commands::Similarity { first, second } => print_similarity(&first, &second)?,
        Commands::Import { csv } => {
            let mut service = open_service(&settings, true)?;
            let embedder = HashingEmbedder::new();
            let loader = if settings.ai_enabled {
                QuestionLoader::with_embedder(&embedder)
            } else {
                QuestionLoader::new()
            };
            let report = loader
                .load_from_csv(&csv, service.db_mut())
                .map_err(anyhow::Error::msg)?;
            for error in &report.errors {
                warn!("{}", error);
            }
            println!(
                "Processed {} rows: {} inserted, {} skipped",
                report.processed, report.inserted, report.skipped
            );
        }
        Commands::AddCourse { name } => {
            let service = open_service(&settings, true)?;
            let id = service.db().insert_course(&name)?;
            println!("{}", id);
        }
        Commands::Ask {
            course,
            title,
            body,
            anonymous,
        } => {
            let service = open_service(&settings, true)?;
            let question = service.create_question(course, &title, &body, anonymous)?;
            println!("{}", question.id);
        }
        Commands::Backfill => {
            if !settings.ai_enabled {
                bail!(
                    "Embeddings are disabled; pass --ai or set {}=true",
                    AI_ENABLED_VAR
                );
            }
            let service = open_service(&settings, false)?;
            if let Some(report) = service.run_startup_backfill() {
                println!(
                    "Backfilled {} of {} questions ({} failed)",
                    report.succeeded, report.candidates, report.failed
                );
            }
        }
        Commands::Group {
            course,
            threshold,
            strict,
        } => {
            let threshold = if strict {
                STRICT_GROUPING_THRESHOLD
            } else {
                threshold.unwrap_or(settings.threshold)
            };
            if !settings.ai_enabled {
                warn!("Embeddings are disabled; no groups will be produced");
            }
            let service = open_service(&settings, true)?;
            let groups = service.grouped_questions(course, threshold)?;
            info!("Course {}: {} groups", course, groups.len());
            println!("{}", serde_json::to_string_pretty(&groups)?);
        }
    }

    Ok(())
}

/// Opens the store and, when asked, runs the feature-flagged startup
/// backfill before handing the service out.
fn open_service(settings: &Settings, startup_backfill: bool) -> Result<QuestionService> {
    let db = Database::new(&settings.db_path)
        .with_context(|| format!("Failed to open database {}", settings.db_path))?;
    let service = QuestionService::new(db, Box::new(HashingEmbedder::new()), settings);
    if startup_backfill {
        service.run_startup_backfill();
    }
    Ok(service)
}

fn print_embedding(text: &str) -> Result<()> {
    let terms = normalizer::normalize(text);
    let embedder = HashingEmbedder::new();
    let vector = embedder.embed(text);
    let active = vector.iter().filter(|v| **v != 0.0).count();

    println!("terms: {}", serde_json::to_string(&terms)?);
    println!(
        "embedder: {} ({} dimensions, {} active)",
        embedder.name(),
        vector.len(),
        active
    );
    Ok(())
}

fn print_similarity(first: &str, second: &str) -> Result<()> {
    let embedder = HashingEmbedder::new();
    let a = embedder.embed(first);
    let b = embedder.embed(second);

    let cosine = cosine_similarity(&a, &b)?;
    let distance = euclidean_distance(&a, &b)?;
    println!("cosine: {:.4}", cosine);
    println!("euclidean: {:.4}", distance);
    println!(
        "groups at default {:.2}: {}",
        DEFAULT_GROUPING_THRESHOLD,
        cosine >= DEFAULT_GROUPING_THRESHOLD
    );
    Ok(())
}
