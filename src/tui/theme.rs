//! Color themes for the playground, cycled from the UI or pre-selected with
//! `--theme`.

use ratatui::style::{Color, Style};

pub(crate) struct Theme {
    pub name: &'static str,
    /// Titles, tab highlights, key hints.
    pub accent: Color,
    /// Line-number gutter.
    pub gutter: Color,
    /// De-emphasized chrome (borders, inactive tabs).
    pub dim: Color,
    /// Background for the one-character diagnostic marker.
    pub error: Color,
    /// Run-state indicator while a script is executing.
    pub running: Color,
}

impl Theme {
    pub(crate) fn marker_style(&self) -> Style {
        Style::default().fg(Color::White).bg(self.error)
    }
}

pub(crate) const THEMES: &[Theme] = &[
    Theme {
        name: "default",
        accent: Color::Cyan,
        gutter: Color::DarkGray,
        dim: Color::Gray,
        error: Color::Red,
        running: Color::Yellow,
    },
    Theme {
        name: "dark",
        accent: Color::LightBlue,
        gutter: Color::Rgb(90, 90, 90),
        dim: Color::Rgb(140, 140, 140),
        error: Color::Rgb(180, 40, 40),
        running: Color::LightYellow,
    },
    Theme {
        name: "light",
        accent: Color::Blue,
        gutter: Color::Rgb(160, 160, 160),
        dim: Color::Rgb(120, 120, 120),
        error: Color::Rgb(200, 60, 60),
        running: Color::Rgb(180, 120, 0),
    },
    Theme {
        name: "solarized-dark",
        accent: Color::Rgb(38, 139, 210),
        gutter: Color::Rgb(88, 110, 117),
        dim: Color::Rgb(101, 123, 131),
        error: Color::Rgb(220, 50, 47),
        running: Color::Rgb(181, 137, 0),
    },
    Theme {
        name: "solarized-light",
        accent: Color::Rgb(38, 139, 210),
        gutter: Color::Rgb(147, 161, 161),
        dim: Color::Rgb(131, 148, 150),
        error: Color::Rgb(220, 50, 47),
        running: Color::Rgb(203, 75, 22),
    },
    Theme {
        name: "monokai",
        accent: Color::Rgb(102, 217, 239),
        gutter: Color::Rgb(117, 113, 94),
        dim: Color::Rgb(150, 150, 140),
        error: Color::Rgb(249, 38, 114),
        running: Color::Rgb(230, 219, 116),
    },
];

/// Index of a theme by name, used to honor `--theme` at startup.
pub(crate) fn find_index(name: &str) -> Option<usize> {
    THEMES.iter().position(|t| t.name == name)
}
