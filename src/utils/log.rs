// src/utils/log.rs

//! Console output helpers for the CLI.
//!
//! Lines look like `[2026-01-31 09:00:00] [INFO] message`. Library code logs
//! through the `log` facade instead; these helpers are for human-facing
//! progress and summaries.

use std::sync::OnceLock;

use chrono::Local;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "debug" | "trace" => LogLevel::Debug,
            "warn" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

static LOG_LEVEL: OnceLock<LogLevel> = OnceLock::new();

/// Set the minimum level. Only the first call takes effect.
pub fn init(level: &str) {
    let _ = LOG_LEVEL.set(LogLevel::parse(level));
}

fn enabled(level: LogLevel) -> bool {
    level >= LOG_LEVEL.get().copied().unwrap_or(LogLevel::Info)
}

fn format_line(level: LogLevel, message: &str) -> String {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    format!("[{}] [{}] {}", timestamp, level.as_str(), message)
}

fn emit(level: LogLevel, message: &str) {
    if !enabled(level) {
        return;
    }
    let line = format_line(level, message);
    match level {
        LogLevel::Info => println!("{}", line),
        _ => eprintln!("{}", line),
    }
}

pub fn debug(message: &str) {
    emit(LogLevel::Debug, message);
}

pub fn info(message: &str) {
    emit(LogLevel::Info, message);
}

pub fn warn(message: &str) {
    emit(LogLevel::Warn, message);
}

pub fn error(message: &str) {
    emit(LogLevel::Error, message);
}

/// Success line, shown even when the level is above INFO.
pub fn success(message: &str) {
    println!("{}", format_line(LogLevel::Info, message));
}

/// `[STEP n/total] message`
pub fn step(step_num: usize, total: usize, message: &str) {
    emit(
        LogLevel::Info,
        &format!("[STEP {}/{}] {}", step_num, total, message),
    );
}

pub fn separator() {
    emit(LogLevel::Info, &"─".repeat(60));
}

/// Title between two heavy rules.
pub fn header(title: &str) {
    let border = "═".repeat(60);
    emit(LogLevel::Info, &border);
    emit(LogLevel::Info, &format!("  {}", title));
    emit(LogLevel::Info, &border);
}

/// Indented detail line.
pub fn sub_item(message: &str) {
    emit(LogLevel::Info, &format!("    {}", message));
}

/// `[SUMMARY] title` followed by `key: value` lines.
pub fn summary(title: &str, items: &[(&str, String)]) {
    if !enabled(LogLevel::Info) {
        return;
    }
    println!();
    println!("{}", format_line(LogLevel::Info, &format!("[SUMMARY] {}", title)));
    for (key, value) in items {
        println!(
            "{}",
            format_line(LogLevel::Info, &format!("    {}: {}", key, value))
        );
    }
}
