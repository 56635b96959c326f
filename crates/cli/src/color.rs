// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::builder::styling::{Ansi256Color, Color, Style, Styles};
use std::io::IsTerminal;

pub mod codes {
    /// Section headers: steel blue
    pub const HEADER: u8 = 74;
    /// Commands and literals: light grey
    pub const LITERAL: u8 = 250;
    /// Placeholders and context: medium grey
    pub const CONTEXT: u8 = 245;
    /// Ids and secondary text: darker grey
    pub const MUTED: u8 = 240;
    /// Sealed / installed / succeeded: sage green
    pub const DONE: u8 = 108;
    /// Failed: soft red
    pub const FAILED: u8 = 167;
    /// Started / backoff: amber
    pub const ACTIVE: u8 = 179;
}

/// Priority: `NO_COLOR=1` disables, `COLOR=1` forces, otherwise TTY check.
pub fn should_colorize() -> bool {
    if std::env::var("NO_COLOR").is_ok_and(|v| v == "1") {
        return false;
    }
    if std::env::var("COLOR").is_ok_and(|v| v == "1") {
        return true;
    }
    std::io::stdout().is_terminal()
}

/// Build clap `Styles` using the palette.
pub fn styles() -> Styles {
    if !should_colorize() {
        return Styles::plain();
    }
    Styles::styled()
        .header(Style::new().fg_color(Some(Color::Ansi256(Ansi256Color(codes::HEADER)))))
        .literal(Style::new().fg_color(Some(Color::Ansi256(Ansi256Color(codes::LITERAL)))))
        .placeholder(Style::new().fg_color(Some(Color::Ansi256(Ansi256Color(codes::CONTEXT)))))
}

const RESET: &str = "\x1b[0m";

fn paint(code: u8, text: &str) -> String {
    if should_colorize() {
        format!("\x1b[38;5;{code}m{text}{RESET}")
    } else {
        text.to_string()
    }
}

pub fn header(text: &str) -> String {
    paint(codes::HEADER, text)
}

pub fn muted(text: &str) -> String {
    paint(codes::MUTED, text)
}

/// Color a job or result status by outcome. Matching ignores padding, so
/// callers can pad before painting.
pub fn status(text: &str) -> String {
    match text.trim() {
        "sealed" | "installed" | "succeeded" => paint(codes::DONE, text),
        "failed" => paint(codes::FAILED, text),
        "started" | "backoff" => paint(codes::ACTIVE, text),
        "skipped" => paint(codes::MUTED, text),
        _ => paint(codes::CONTEXT, text),
    }
}

#[cfg(test)]
#[path = "color_tests.rs"]
mod tests;
