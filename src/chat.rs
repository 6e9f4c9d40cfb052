//! Terminal front end: answer rendering, one-shot `ask`, and the `chat`
//! read-eval loop.
//!
//! Answers and sources go to the output writer (stdout in the binary);
//! progress and logs go to stderr. Errors inside the loop are printed as
//! `Error: <message>` and the loop continues with the session intact.

use anyhow::Result;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use crate::ingest::read_paths;
use crate::models::{ConversationTurn, Role};
use crate::progress::ProgressReporter;
use crate::prompt::source_excerpt;
use crate::services::Services;
use crate::session::{Answer, IngestReport, Session};

/// Render source excerpts as `Source {i}: {excerpt}...`, numbered from 1.
pub fn render_sources(excerpts: &[String]) -> String {
    excerpts
        .iter()
        .enumerate()
        .map(|(i, e)| format!("Source {}: {}...", i + 1, e))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_answer(answer: &Answer) -> String {
    let excerpts: Vec<String> = answer
        .sources
        .iter()
        .map(|s| source_excerpt(&s.chunk))
        .collect();
    render_reply(&answer.text, &excerpts)
}

fn render_reply(text: &str, excerpts: &[String]) -> String {
    if excerpts.is_empty() {
        return text.to_string();
    }
    format!("{}\n\nSources:\n{}", text, render_sources(excerpts))
}

pub fn render_turn(turn: &ConversationTurn) -> String {
    match turn.role {
        Role::User => format!("you> {}", turn.content),
        Role::Assistant => format!("assistant> {}", render_reply(&turn.content, &turn.sources)),
    }
}

pub fn render_ingest(report: &IngestReport) -> String {
    format!(
        "Indexed {} file(s): {} page(s), {} chunk(s), {}-dim vectors",
        report.files, report.segments, report.chunks, report.dims
    )
}

fn render_status(session: &Session) -> String {
    let status = session.status();
    let s = &status.settings;
    let index = match status.indexed_chunks {
        Some(n) => format!("{} chunk(s) from {}", n, status.indexed_sources.join(", ")),
        None => "none".to_string(),
    };
    format!(
        "model:       {}\n\
         chunking:    size {} / overlap {}\n\
         retrieval:   k = {}\n\
         sampling:    temperature {} / max tokens {}\n\
         token:       {}\n\
         index:       {}\n\
         turns:       {}",
        s.model(),
        s.chunk_size(),
        s.chunk_overlap(),
        s.k(),
        s.temperature(),
        s.max_tokens(),
        if status.has_token { "set" } else { "missing" },
        index,
        status.turns
    )
}

/// A line typed at the chat prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Ask(String),
    Ingest(Vec<PathBuf>),
    Reset,
    History,
    Status,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

impl ReplCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return ReplCommand::Empty;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return ReplCommand::Ask(line.to_string());
        };
        let mut parts = rest.split_whitespace();
        match parts.next().unwrap_or("") {
            "reset" => ReplCommand::Reset,
            "history" => ReplCommand::History,
            "status" => ReplCommand::Status,
            "help" => ReplCommand::Help,
            "quit" | "exit" => ReplCommand::Quit,
            "ingest" => ReplCommand::Ingest(parts.map(PathBuf::from).collect()),
            other => ReplCommand::Unknown(other.to_string()),
        }
    }
}

const HELP: &str = "\
Type a question to ask it. Commands:
  /ingest <files...>  rebuild the index from new files
  /reset              clear the conversation (the index is kept)
  /history            show the conversation
  /status             show settings and index state
  /quit               exit";

/// Read files from disk and rebuild the session index.
pub async fn ingest_paths(
    session: &mut Session,
    services: &Services,
    paths: &[PathBuf],
    progress: &dyn ProgressReporter,
) -> Result<IngestReport> {
    let files = read_paths(paths)?;
    let report = session
        .ingest(files, services.embedder.as_ref(), services.batch_size, progress)
        .await?;
    Ok(report)
}

/// One-shot question: ingest `paths`, answer, print the answer and sources.
pub async fn run_ask(
    mut session: Session,
    services: &Services,
    paths: &[PathBuf],
    question: &str,
    progress: &dyn ProgressReporter,
    out: &mut dyn Write,
) -> Result<()> {
    ingest_paths(&mut session, services, paths, progress).await?;
    let answer = session
        .ask(
            question,
            services.embedder.as_ref(),
            services.generator.as_ref(),
            progress,
        )
        .await?;
    writeln!(out, "{}", render_answer(&answer))?;
    Ok(())
}

/// Interactive loop over `input` until EOF or `/quit`.
///
/// `prompt` controls whether a `> ` prompt is written before each line;
/// the binary enables it only when stdin is a terminal.
pub async fn run_repl(
    session: &mut Session,
    services: &Services,
    input: &mut dyn BufRead,
    out: &mut dyn Write,
    progress: &dyn ProgressReporter,
    prompt: bool,
) -> Result<()> {
    let mut line = String::new();
    loop {
        if prompt {
            write!(out, "> ")?;
            out.flush()?;
        }
        line.clear();
        if input.read_line(&mut line)? == 0 {
            break;
        }

        match ReplCommand::parse(&line) {
            ReplCommand::Empty => {}
            ReplCommand::Quit => break,
            ReplCommand::Help => writeln!(out, "{}", HELP)?,
            ReplCommand::Reset => {
                session.reset();
                writeln!(out, "Conversation cleared.")?;
            }
            ReplCommand::History => {
                if session.history().is_empty() {
                    writeln!(out, "(no conversation yet)")?;
                }
                for turn in session.history() {
                    writeln!(out, "{}", render_turn(turn))?;
                }
            }
            ReplCommand::Status => writeln!(out, "{}", render_status(session))?,
            ReplCommand::Ingest(paths) => {
                if paths.is_empty() {
                    writeln!(out, "Error: /ingest needs at least one path")?;
                    continue;
                }
                match ingest_paths(session, services, &paths, progress).await {
                    Ok(report) => writeln!(out, "{}", render_ingest(&report))?,
                    Err(e) => writeln!(out, "Error: {:#}", e)?,
                }
            }
            ReplCommand::Ask(question) => {
                let result = session
                    .ask(
                        &question,
                        services.embedder.as_ref(),
                        services.generator.as_ref(),
                        progress,
                    )
                    .await;
                match result {
                    Ok(answer) => writeln!(out, "{}", render_answer(&answer))?,
                    Err(e) => writeln!(out, "Error: {}", e)?,
                }
            }
            ReplCommand::Unknown(cmd) => {
                writeln!(out, "Error: unknown command /{} (try /help)", cmd)?
            }
        }
    }
    Ok(())
}
