//! Terminal output for command results
//!
//! Every command produces a serializable report. JSON formats print it
//! as-is; text format renders it as tables and headers.

use clap::ValueEnum;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table, presets};
use owo_colors::OwoColorize;
use serde::Serialize;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable tables
    Text,
    /// Compact JSON
    Json,
    /// Indented JSON
    JsonPretty,
}

impl OutputFormat {
    pub fn is_json(self) -> bool {
        matches!(self, Self::Json | Self::JsonPretty)
    }

    /// Serialize `value` in this JSON flavor, or `None` for text output
    pub fn to_json<T: Serialize>(self, value: &T) -> serde_json::Result<Option<String>> {
        match self {
            Self::Text => Ok(None),
            Self::Json => serde_json::to_string(value).map(Some),
            Self::JsonPretty => serde_json::to_string_pretty(value).map(Some),
        }
    }
}

/// Colour and border preferences
#[derive(Debug, Clone, Copy)]
pub struct OutputStyle {
    pub use_color: bool,
}

impl Default for OutputStyle {
    fn default() -> Self {
        Self {
            use_color: std::env::var_os("NO_COLOR").is_none(),
        }
    }
}

impl OutputStyle {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Print a JSON report, returning `false` when the format is text
pub fn print_json<T: Serialize>(format: OutputFormat, value: &T) -> anyhow::Result<bool> {
    match format.to_json(value)? {
        Some(json) => {
            println!("{json}");
            Ok(true)
        }
        None => Ok(false),
    }
}

pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
    table
}

pub fn header_cell(text: &str, style: &OutputStyle) -> Cell {
    let cell = Cell::new(text)
        .add_attribute(Attribute::Bold)
        .set_alignment(CellAlignment::Left);
    if style.use_color {
        cell.fg(Color::Cyan)
    } else {
        cell
    }
}

pub fn numeric_cell(value: impl ToString) -> Cell {
    Cell::new(value.to_string()).set_alignment(CellAlignment::Right)
}

pub fn print_section_header(title: &str, style: &OutputStyle) {
    if style.use_color {
        println!("\n{}", title.bold().bright_blue());
        println!("{}", "═".repeat(title.chars().count()).bright_blue());
    } else {
        println!("\n{title}");
        println!("{}", "=".repeat(title.chars().count()));
    }
}

pub fn format_success(text: &str, style: &OutputStyle) -> String {
    if style.use_color {
        text.green().to_string()
    } else {
        text.to_string()
    }
}

pub fn format_warning(text: &str, style: &OutputStyle) -> String {
    if style.use_color {
        text.yellow().to_string()
    } else {
        text.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
#[allow(clippy::expect_used)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_json_flavors() {
        let value = json!({"deletedUrls": ["a"]});
        assert_eq!(OutputFormat::Text.to_json(&value).unwrap(), None);
        assert_eq!(
            OutputFormat::Json.to_json(&value).unwrap().unwrap(),
            r#"{"deletedUrls":["a"]}"#
        );
        assert!(
            OutputFormat::JsonPretty
                .to_json(&value)
                .unwrap()
                .unwrap()
                .contains('\n')
        );
    }

    #[test]
    fn test_plain_style_leaves_text_alone() {
        let style = OutputStyle { use_color: false };
        assert_eq!(format_success("done", &style), "done");
        assert_eq!(format_warning("careful", &style), "careful");
    }
}
