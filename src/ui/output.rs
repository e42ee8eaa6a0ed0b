use crate::adapter::ParseResult;
use crate::ui::{Icons, theme};
use owo_colors::OwoColorize;

pub fn header(text: &str) {
    println!("{} {}", Icons::ROCKET, text.style(theme().header.clone()));
}

pub fn success(label: &str) {
    println!("{} {}", Icons::CHECK, label.style(theme().success.clone()));
}

pub fn error(label: &str) {
    eprintln!("{} {}", Icons::CROSS, label.style(theme().error.clone()));
}

pub fn warn(label: &str) {
    eprintln!("{} {}", Icons::WARN, label.style(theme().warn.clone()));
}

pub fn info(label: &str, value: &str) {
    println!("{} {}: {}", Icons::INFO.style(theme().info.clone()), label.style(theme().dim.clone()), value);
}

pub fn section(title: &str) {
    println!();
    println!("━{}━", title.style(theme().header.clone()));
}

pub fn summary_row(label: &str, value: &str) {
    println!("  {} {}", label.style(theme().dim.clone()), value);
}

/// Human-readable dump of one file's result
pub fn print_result(path: &str, result: &ParseResult) {
    section(path);
    if !result.entities.is_empty() {
        println!("{}", crate::ui::entity_table(&result.entities));
    }
    for rel in &result.relationships {
        let line = rel
            .properties
            .get("line")
            .and_then(|v| v.as_int())
            .map(|l| format!(" @{}", l))
            .unwrap_or_default();
        println!(
            "  {} {} {} {}{}",
            Icons::LINK,
            rel.from_name,
            rel.kind.as_str().style(theme().info.clone()),
            rel.to_name,
            line.style(theme().dim.clone())
        );
    }
    for message in &result.errors {
        warn(message);
    }
}
