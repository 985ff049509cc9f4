//! Terminal output helpers. Color only when stdout is a terminal.

use is_terminal::IsTerminal;
use owo_colors::OwoColorize;

pub fn use_color() -> bool {
    std::io::stdout().is_terminal()
}

pub fn ok(text: &str) -> String {
    if use_color() {
        text.green().to_string()
    } else {
        text.to_string()
    }
}

pub fn bad(text: &str) -> String {
    if use_color() {
        text.red().to_string()
    } else {
        text.to_string()
    }
}

pub fn dim(text: &str) -> String {
    if use_color() {
        text.dimmed().to_string()
    } else {
        text.to_string()
    }
}

pub fn flag(value: bool) -> String {
    if value {
        ok("true")
    } else {
        bad("false")
    }
}

/// Short display form of an artifact id.
pub fn short_id(id: &uuid::Uuid) -> String {
    id.to_string().chars().take(8).collect()
}
