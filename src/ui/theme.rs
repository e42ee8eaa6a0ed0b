use owo_colors::Style;
use std::sync::OnceLock;

static THEME: OnceLock<Theme> = OnceLock::new();

pub struct Icons;

impl Icons {
    pub const ROCKET: &str = "🚀";
    pub const CHECK: &str = "✅";
    pub const CROSS: &str = "❌";
    pub const WARN: &str = "⚠️";
    pub const INFO: &str = "ℹ️";
    pub const FILE: &str = "📄";
    pub const PACKAGE: &str = "📦";
    pub const LINK: &str = "🔗";
    pub const CLOCK: &str = "⏱️";
}

/// Styles for the CLI; plain when stdout is not a terminal
#[derive(Debug, Clone)]
pub struct Theme {
    pub header: Style,
    pub success: Style,
    pub error: Style,
    pub warn: Style,
    pub info: Style,
    pub dim: Style,
}

impl Theme {
    pub fn detect() -> Self {
        if console::Term::stdout().is_term() {
            Self {
                header: Style::new().cyan().bold(),
                success: Style::new().green().bold(),
                error: Style::new().red().bold(),
                warn: Style::new().yellow().bold(),
                info: Style::new().magenta(),
                dim: Style::new().bright_black(),
            }
        } else {
            Self {
                header: Style::new(),
                success: Style::new(),
                error: Style::new(),
                warn: Style::new(),
                info: Style::new(),
                dim: Style::new(),
            }
        }
    }
}

pub fn theme() -> &'static Theme {
    THEME.get_or_init(Theme::detect)
}
