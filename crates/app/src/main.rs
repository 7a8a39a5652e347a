use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use coach_core::model::{
    CharacterId, ContentMode, Language, LearnerId, Question, QuestionOrder, SessionFilters,
    option_label, parse_tag_list,
};
use services::{
    Clock, CoachConfig, CoachServices, ResolveError, SessionConfig, SessionError, SessionHub,
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Certification study coach with persona-voiced questions and explanations.
#[derive(Parser, Debug)]
#[command(name = "coach", version, about)]
struct Cli {
    /// Directory holding `<character>_questions.json` banks
    #[arg(long, global = true)]
    questions_dir: Option<PathBuf>,

    /// SQLite database for learning history (file path or sqlite:// URL)
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run an interactive quiz session
    Quiz(QuizArgs),
    /// List the built-in characters
    Characters {
        #[arg(long, default_value = "ja")]
        language: Language,
    },
    /// Show a learner's history, weaknesses and strengths
    Stats {
        #[arg(long, default_value = "local")]
        learner: String,
    },
}

#[derive(Args, Debug)]
struct QuizArgs {
    #[arg(short, long, default_value = "yuri")]
    character: String,

    #[arg(short, long, default_value = "ja")]
    language: Language,

    /// Comma-separated tag filter, e.g. "S3,VPC"
    #[arg(short, long)]
    tags: Option<String>,

    /// offline, static_first or generative
    #[arg(short, long, default_value = "static_first")]
    mode: ContentMode,

    /// Stop after this many answers
    #[arg(short = 'n', long)]
    length: Option<u32>,

    /// Replayable random order
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, default_value = "local")]
    learner: String,

    /// Write narrated explanations as MP3 files into this directory
    #[arg(long)]
    narrate_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(Cli::parse()).await {
        eprintln!("{err:#}");
        std::process::exit(2);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = CoachConfig::from_env()?;
    if let Some(dir) = cli.questions_dir {
        config.questions_dir = dir;
    }
    if let Some(db) = cli.db {
        config.db_url = Some(normalize_sqlite_url(&db));
    }
    if let Some(url) = &config.db_url {
        prepare_sqlite_file(url)?;
    }

    let services = CoachServices::from_config(config, Clock::system())
        .await
        .context("failed to start the coach")?;

    match cli.command {
        Command::Quiz(args) => quiz(&services, args).await,
        Command::Characters { language } => {
            characters(&services, language);
            Ok(())
        }
        Command::Stats { learner } => stats(&services, LearnerId::new(learner)).await,
    }
}

fn characters(services: &CoachServices, language: Language) {
    for character in services.characters().list() {
        let style = character.style();
        println!(
            "{} {:<8} {:<12} {:<13} {}",
            character.emoji(),
            character.id().as_str(),
            character.display_name(language),
            style.difficulty.as_str(),
            style.focus
        );
    }
}

async fn stats(services: &CoachServices, learner: LearnerId) -> anyhow::Result<()> {
    let overview = services.history().overview(&learner).await?;
    if overview.total == 0 {
        println!("No answers recorded for {learner} yet.");
        return Ok(());
    }

    println!(
        "{learner}: {}/{} correct ({:.0}%)",
        overview.correct,
        overview.total,
        overview.accuracy.unwrap_or_default() * 100.0
    );
    for stat in &overview.by_character {
        println!("  {:<8} {}/{}", stat.character_id.as_str(), stat.correct, stat.total);
    }
    if !overview.weaknesses.is_empty() {
        println!("Needs work:");
        for stat in &overview.weaknesses {
            println!("  {:<20} {:.0}% of {}", stat.tag.as_str(), stat.accuracy() * 100.0, stat.total);
        }
    }
    if !overview.strengths.is_empty() {
        println!("Strong:");
        for stat in &overview.strengths {
            println!("  {:<20} {:.0}% of {}", stat.tag.as_str(), stat.accuracy() * 100.0, stat.total);
        }
    }
    for summary in &overview.recent_sessions {
        println!(
            "  session {} with {}: {}/{} ({})",
            summary.ended_at().format("%Y-%m-%d %H:%M"),
            summary.character_id(),
            summary.score().correct,
            summary.score().total,
            summary.reason().as_str()
        );
    }
    Ok(())
}

//
// ─── QUIZ LOOP ─────────────────────────────────────────────────────────────────
//

async fn quiz(services: &CoachServices, args: QuizArgs) -> anyhow::Result<()> {
    let hub = services.hub();
    let mut filters = SessionFilters::new(CharacterId::new(&args.character), args.language);
    if let Some(raw) = &args.tags {
        filters = filters.with_tags(parse_tag_list(raw));
    }
    let order = args.seed.map_or(QuestionOrder::LowestId, QuestionOrder::Seeded);
    let length = args.length.or(services.config().session_length);
    let config = SessionConfig::new(LearnerId::new(args.learner.clone()), filters)
        .with_mode(args.mode)
        .with_order(order)
        .with_session_length(length);

    let session = hub.start(config).await?;
    if let Some(dir) = &args.narrate_dir {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("cannot create {}", dir.display()))?;
    }

    let character = services
        .characters()
        .get(&session.filters.character_id)?
        .clone();
    println!(
        "{} {} ({} mode). Answer with a letter, or q to stop.",
        character.emoji(),
        character.display_name(args.language),
        session.mode.as_str()
    );

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let question = match hub.advance(session.id).await {
            Ok(question) => question,
            Err(SessionError::Resolve(ResolveError::GenerationUnavailable(e))) => {
                println!("Could not get a new question right now ({e}).");
                break;
            }
            Err(SessionError::Resolve(ResolveError::ExhaustedAndUnavailable)) => {
                println!("No more questions for this selection.");
                break;
            }
            Err(e) => return Err(e.into()),
        };

        print_question(&question, args.language);
        let Some(selected) = read_choice(&mut input, &question, args.language).await? else {
            break;
        };

        let outcome = hub.answer(session.id, selected).await?;
        if outcome.correct {
            println!("Correct! ({}/{})", outcome.score.correct, outcome.score.total);
        } else {
            println!(
                "Not quite, the answer is {}. ({}/{})",
                option_label(outcome.correct_index),
                outcome.score.correct,
                outcome.score.total
            );
        }

        match hub.explanation(session.id).await {
            Ok(explanation) => {
                println!("{} {}", character.emoji(), explanation.body);
                if let Some(dir) = &args.narrate_dir {
                    narrate(hub, session.id, &explanation.body, dir).await;
                }
            }
            Err(e) => warn!(error = %e, "explanation unavailable"),
        }

        if outcome.ended.is_some() {
            break;
        }
    }

    let summary = hub.end(session.id).await?;
    println!(
        "Session over: {}/{} correct.",
        summary.score.correct, summary.score.total
    );
    Ok(())
}

fn print_question(question: &Question, language: Language) {
    let Some(text) = question.text_or_fallback(language) else {
        return;
    };
    let tags = question
        .tags()
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    println!();
    println!("[{tags}] {}", text.stem);
    for (i, option) in text.options.iter().enumerate() {
        println!("  {}. {option}", option_label(i));
    }
}

/// Read until the learner picks a valid option; `None` means quit.
async fn read_choice(
    input: &mut Lines<BufReader<Stdin>>,
    question: &Question,
    language: Language,
) -> anyhow::Result<Option<usize>> {
    let count = question.option_count();
    loop {
        let Some(line) = input.next_line().await? else {
            return Ok(None);
        };
        let line = line.trim();
        if line.eq_ignore_ascii_case("q") {
            return Ok(None);
        }
        if let Some(index) = parse_choice(line, count) {
            return Ok(Some(index));
        }
        match language {
            Language::Ja => println!("A〜{} で答えてください。", option_label(count - 1)),
            Language::En => println!("Please answer A-{}.", option_label(count - 1)),
        }
    }
}

/// Accepts a letter (`b`, `B`) or a 1-based number.
fn parse_choice(raw: &str, option_count: usize) -> Option<usize> {
    let index = match raw.parse::<usize>() {
        Ok(n) => n.checked_sub(1)?,
        Err(_) => {
            let mut chars = raw.chars();
            let c = chars.next()?.to_ascii_uppercase();
            if chars.next().is_some() || !c.is_ascii_uppercase() {
                return None;
            }
            usize::from(c as u8 - b'A')
        }
    };
    (index < option_count).then_some(index)
}

async fn narrate(hub: &SessionHub, session: coach_core::model::SessionId, text: &str, dir: &Path) {
    match hub.narrate(session, text).await {
        Ok(narration) => {
            let key = &narration.entry.key;
            let path = dir.join(format!("{}.mp3", key.get(..16).unwrap_or(key)));
            if let Err(e) = tokio::fs::write(&path, &narration.entry.audio).await {
                warn!(path = %path.display(), error = %e, "could not write narration");
            } else {
                println!("(audio: {})", path.display());
            }
        }
        Err(e) => warn!(error = %e, "narration unavailable"),
    }
}

//
// ─── SQLITE GLUE ───────────────────────────────────────────────────────────────
//

fn normalize_sqlite_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with("sqlite://") || trimmed.starts_with("sqlite::memory:") {
        return trimmed.to_string();
    }

    let path_str = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed);
    let path = Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

/// Create the database file (and its directory) so the pool can open it.
fn prepare_sqlite_file(db_url: &str) -> anyhow::Result<()> {
    let Some(path) = db_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        bail!("invalid database url: {db_url}");
    }

    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choices_accept_letters_and_numbers() {
        assert_eq!(parse_choice("b", 4), Some(1));
        assert_eq!(parse_choice("D", 4), Some(3));
        assert_eq!(parse_choice("1", 4), Some(0));
        assert_eq!(parse_choice("E", 4), None);
        assert_eq!(parse_choice("0", 4), None);
        assert_eq!(parse_choice("ab", 4), None);
        assert_eq!(parse_choice("", 4), None);
        assert_eq!(parse_choice("あ", 4), None);
    }

    #[test]
    fn sqlite_urls_are_made_absolute() {
        assert_eq!(normalize_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(normalize_sqlite_url("sqlite:///tmp/a.db"), "sqlite:///tmp/a.db");
        assert_eq!(normalize_sqlite_url("/tmp/b.db"), "sqlite:///tmp/b.db");
        assert!(normalize_sqlite_url("coach.db").ends_with("/coach.db"));
    }

    #[test]
    fn cli_parses_quiz_flags() {
        let cli = Cli::parse_from([
            "coach", "quiz", "-c", "botan", "-l", "en", "-t", "S3,VPC", "-m", "offline", "--seed", "7",
        ]);
        let Command::Quiz(args) = cli.command else {
            panic!("expected quiz");
        };
        assert_eq!(args.character, "botan");
        assert_eq!(args.language, Language::En);
        assert_eq!(args.mode, ContentMode::OfflineOnly);
        assert_eq!(args.seed, Some(7));
    }
}
