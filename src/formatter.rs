//! Renders ranked results as the message shown to the user.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::segments::RankedResult;

/// Operator-supplied phrases used around the result list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Phrasebook {
    /// Opening lines; one is chosen per query.
    pub greetings: Vec<String>,
    /// Closing follow-up cues; one is chosen per query. May be empty.
    #[serde(default)]
    pub closers: Vec<String>,
    /// Message returned when nothing was found.
    pub no_answer: String,
    /// Marker placed in front of every result line.
    #[serde(default = "default_bullet")]
    pub bullet: String,
}

fn default_bullet() -> String {
    "👉".to_string()
}

impl Default for Phrasebook {
    fn default() -> Self {
        Self {
            greetings: vec![
                "Вот что удалось найти по вашему вопросу:".to_string(),
                "Нашёл несколько сатсангов, где это обсуждается:".to_string(),
            ],
            closers: vec![
                "Если хотите, задайте уточняющий вопрос 🙏".to_string(),
                "Остались вопросы? Спрашивайте ещё 🙂".to_string(),
            ],
            no_answer: "Ой, кажется, я не смог найти точный ответ на ваш вопрос 🤔 \
                        Можете уточнить вопрос для более точного поиска? 🎯"
                .to_string(),
            bullet: default_bullet(),
        }
    }
}

impl Phrasebook {
    /// Loads a phrasebook from a JSON file.
    pub fn from_json_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read phrasebook {:?}", path))?;
        let book: Phrasebook = serde_json::from_str(&raw)
            .with_context(|| format!("invalid phrasebook {:?}", path))?;
        anyhow::ensure!(!book.greetings.is_empty(), "phrasebook needs at least one greeting");
        anyhow::ensure!(!book.no_answer.trim().is_empty(), "phrasebook needs a no-answer message");
        Ok(book)
    }
}

/// Turns ranked results into display text.
#[derive(Debug, Clone, Default)]
pub struct ResultFormatter {
    phrases: Phrasebook,
}

impl ResultFormatter {
    /// Creates a formatter over a phrasebook.
    pub fn new(phrases: Phrasebook) -> Self {
        Self { phrases }
    }

    /// Renders `results` in the given order.
    ///
    /// Phrase variants are picked from a checksum of the query, so the same input
    /// always renders the same text.
    pub fn format(&self, results: &[RankedResult], query: &str) -> String {
        if results.is_empty() {
            return self.phrases.no_answer.clone();
        }
        let seed = crc32fast::hash(query.as_bytes()) as usize;
        let mut blocks = Vec::with_capacity(results.len() + 2);
        if let Some(greeting) = pick(&self.phrases.greetings, seed) {
            blocks.push(greeting.to_string());
        }
        for result in results {
            blocks.push(format!(
                "{} [{}]({})",
                self.phrases.bullet,
                link_text(&result.title, &result.video_id),
                result.url
            ));
        }
        if let Some(closer) = pick(&self.phrases.closers, seed / 7) {
            blocks.push(closer.to_string());
        }
        blocks.join("\n\n")
    }
}

fn pick(options: &[String], seed: usize) -> Option<&str> {
    if options.is_empty() {
        return None;
    }
    Some(options[seed % options.len()].as_str())
}

fn link_text(title: &str, video_id: &str) -> String {
    let label = if title.trim().is_empty() { video_id } else { title };
    label.replace('[', "(").replace(']', ")")
}
