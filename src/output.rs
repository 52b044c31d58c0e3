//! # Output Rendering
//!
//! Plain-text rendering of status and pull request tables, plus the color
//! decision for the terminal.
//!
//! ## Respecting User Preferences
//!
//! - `--color=never|always|auto` - CLI flag for color control
//! - `NO_COLOR` - Disables colors when set (per https://no-color.org/)
//! - `CLICOLOR=0` - Disables colors
//! - `CLICOLOR_FORCE=1` - Forces colors even in non-TTY
//! - `TERM=dumb` - Disables colors for dumb terminals
//!
//! ## Status markers
//!
//! | marker | meaning                              |
//! |--------|--------------------------------------|
//! | `>`    | ahead: local commits not on remote   |
//! | `<`    | behind: remote commits not local     |
//! | `!`    | ahead and behind, merge conflicts    |
//! | `-`    | in sync                              |

use std::env;

use console::Style;

use crate::github::{PrLookup, PullRequestRecord};
use crate::status::StatusRecord;

/// Whether output may use colors and emoji.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub use_color: bool,
}

impl OutputConfig {
    /// `always` and `never` win; `auto` looks at the environment and the
    /// terminal.
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = match color_flag.to_lowercase().as_str() {
            "always" => true,
            "never" => false,
            _ => Self::detect_color_support(),
        };
        Self { use_color }
    }

    fn detect_color_support() -> bool {
        // Presence alone disables, even when empty.
        if env::var_os("NO_COLOR").is_some() {
            return false;
        }
        if env::var("CLICOLOR").is_ok_and(|v| v == "0") {
            return false;
        }
        if env::var("CLICOLOR_FORCE").is_ok_and(|v| v != "0" && !v.is_empty()) {
            return true;
        }
        if env::var("TERM").is_ok_and(|v| v == "dumb") {
            return false;
        }
        console::Term::stdout().features().colors_supported()
    }

    pub fn with_color() -> Self {
        Self { use_color: true }
    }

    pub fn without_color() -> Self {
        Self { use_color: false }
    }

    /// Applies `style` when colors are on.
    pub fn paint(&self, text: &str, style: Style) -> String {
        if self.use_color {
            style.force_styling(true).apply_to(text).to_string()
        } else {
            text.to_string()
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::from_env_and_flag("auto")
    }
}

/// The emoji when colors are on, the plain alternative otherwise.
pub fn emoji<'a>(config: &OutputConfig, emoji_str: &'a str, plain: &'a str) -> &'a str {
    if config.use_color {
        emoji_str
    } else {
        plain
    }
}

/// Marker column of a status line.
pub fn status_marker(record: &StatusRecord) -> &'static str {
    match (record.ahead, record.behind, record.conflict) {
        (_, _, true) => "!",
        (true, true, false) => "<>",
        (true, false, false) => ">",
        (false, true, false) => "<",
        (false, false, false) => "-",
    }
}

fn marker_style(marker: &str) -> Style {
    match marker {
        "!" => Style::new().red().bold(),
        ">" => Style::new().green(),
        "<" | "<>" => Style::new().yellow(),
        _ => Style::new().dim(),
    }
}

fn id_width<'a>(ids: impl Iterator<Item = &'a str>) -> usize {
    ids.map(str::len).max().unwrap_or(0)
}

/// One line per repository: marker, id, branch, short HEAD.
pub fn render_status(records: &[StatusRecord], config: &OutputConfig) -> String {
    let width = id_width(records.iter().map(|r| r.id.as_str()));
    let mut out = String::new();
    for record in records {
        let marker = status_marker(record);
        out.push_str(&format!(
            "{} {:<width$}  {}  {}\n",
            config.paint(&format!("{:<2}", marker), marker_style(marker)),
            record.id,
            record.head_ref,
            config.paint(&record.local_head_short, Style::new().dim()),
            width = width
        ));
    }
    out
}

fn describe_pr(pr: &PullRequestRecord) -> String {
    let state = format!("{:?}", pr.state).to_lowercase();
    let draft = if pr.is_draft { " (draft)" } else { "" };
    format!("#{} {}{} {}", pr.number, state, draft, pr.url)
}

/// One line per repository and pull request.
pub fn render_pr_status<'a>(
    entries: impl IntoIterator<Item = (&'a str, &'a PrLookup)>,
    config: &OutputConfig,
) -> String {
    let entries: Vec<(&str, &PrLookup)> = entries.into_iter().collect();
    let width = id_width(entries.iter().map(|(id, _)| *id));
    let mut out = String::new();
    for (id, lookup) in entries {
        let text = match lookup {
            PrLookup::NotChecked => config.paint("not checked (no branch)", Style::new().dim()),
            PrLookup::NotFound => config.paint("no pull request", Style::new().dim()),
            PrLookup::Failed(reason) => config.paint(&format!("lookup failed: {}", reason), Style::new().red()),
            PrLookup::Found(prs) => prs.iter().map(describe_pr).collect::<Vec<_>>().join(", "),
        };
        out.push_str(&format!("{:<width$}  {}\n", id, text, width = width));
    }
    out
}
