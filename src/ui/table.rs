use crate::entity::CodeEntity;
use tabled::{Table, Tabled, settings::Style};

#[derive(Tabled)]
struct StatRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Tabled)]
struct EntityRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Line")]
    line: u32,
    #[tabled(rename = "Size")]
    size: usize,
}

pub fn stats_table(stats: &[(&str, String)]) -> String {
    let rows: Vec<StatRow> = stats
        .iter()
        .map(|(label, value)| StatRow {
            metric: label.to_string(),
            value: value.clone(),
        })
        .collect();
    if rows.is_empty() {
        return String::new();
    }
    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn entity_table(entities: &[CodeEntity]) -> String {
    let rows: Vec<EntityRow> = entities
        .iter()
        .map(|e| EntityRow {
            kind: e.kind.as_str().to_string(),
            name: e.name.clone(),
            line: e.line_number,
            size: e.content.len(),
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}
