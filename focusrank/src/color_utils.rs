//! Conditional terminal styling.
//!
//! Colours and emoji are disabled by any of:
//! - the `--no-color` CLI flag
//! - `NO_COLOR` (https://no-color.org/) or `FOCUSRANK_NO_COLOR`
//! - `TERM=dumb`
//! - stderr not being a TTY

use colored::ColoredString;
use std::io::{stderr, IsTerminal};
use std::sync::OnceLock;

static COLOR_CONFIG: OnceLock<ColorConfig> = OnceLock::new();

fn should_disable_colors_from_env() -> bool {
    !std::env::var("NO_COLOR").unwrap_or_default().is_empty()
        || !std::env::var("FOCUSRANK_NO_COLOR")
            .unwrap_or_default()
            .is_empty()
        || std::env::var("TERM").unwrap_or_default() == "dumb"
        || !stderr().is_terminal()
}

#[derive(Debug, Clone)]
struct ColorConfig {
    colors_enabled: bool,
}

impl ColorConfig {
    fn new(no_color_flag: bool) -> Self {
        Self {
            colors_enabled: !no_color_flag && !should_disable_colors_from_env(),
        }
    }
}

/// Initialize the color configuration once, after parsing CLI arguments.
pub fn init_color_config(no_color_flag: bool) {
    let config = ColorConfig::new(no_color_flag);
    if !config.colors_enabled {
        colored::control::set_override(false);
    }
    if COLOR_CONFIG.set(config).is_err() {
        log::debug!("Color configuration already initialized");
    }
}

pub fn colors_enabled() -> bool {
    COLOR_CONFIG
        .get()
        .map(|config| config.colors_enabled)
        .unwrap_or_else(|| !should_disable_colors_from_env())
}

/// Apply color to a string only if colors are enabled for stderr output
pub fn maybe_color_stderr<F>(text: &str, color_fn: F) -> String
where
    F: FnOnce(&str) -> ColoredString,
{
    if colors_enabled() {
        color_fn(text).to_string()
    } else {
        text.to_string()
    }
}

pub mod colors {
    use super::maybe_color_stderr;
    use colored::Colorize;

    pub fn error_level(text: &str) -> String {
        maybe_color_stderr(text, |s| s.red().bold())
    }

    pub fn warning_level(text: &str) -> String {
        maybe_color_stderr(text, |s| s.yellow())
    }

    pub fn info_level(text: &str) -> String {
        maybe_color_stderr(text, |s| s.green())
    }

    pub fn debug_level(text: &str) -> String {
        maybe_color_stderr(text, |s| s.blue())
    }

    pub fn trace_level(text: &str) -> String {
        maybe_color_stderr(text, |s| s.magenta())
    }

    /// Highlight for method keys and file names
    pub fn emphasis(text: &str) -> String {
        maybe_color_stderr(text, |s| s.cyan().bold())
    }
}

/// Semantic symbols for different operation types and states
pub mod symbols {
    use super::colors_enabled;

    fn pick(emoji: &'static str, plain: &'static str) -> &'static str {
        if colors_enabled() {
            emoji
        } else {
            plain
        }
    }

    pub fn ranking_start() -> &'static str {
        pick("🔍 ", "")
    }

    pub fn resources_found() -> &'static str {
        pick("🎯 ", "")
    }

    pub fn model_loaded() -> &'static str {
        pick("✅ ", "")
    }

    pub fn system_setup() -> &'static str {
        pick("⚙️ ", "")
    }

    pub fn no_region() -> &'static str {
        pick("🫥 ", "")
    }

    pub fn ranking_result() -> &'static str {
        pick("🏁 ", "")
    }

    pub fn dry_run() -> &'static str {
        pick("📝 ", "[DRY-RUN] ")
    }

    pub fn operation_failed() -> &'static str {
        pick("❌ ", "[FAILED] ")
    }

    pub fn completed_successfully() -> &'static str {
        pick("✅ ", "[SUCCESS] ")
    }

    pub fn completed_partially_successfully() -> &'static str {
        pick("⚠️  ", "[PARTIAL-SUCCESS] ")
    }

    pub fn warning() -> &'static str {
        pick("⚠️  ", "")
    }
}

/// Progress bar utilities that respect TTY state
pub mod progress {
    use crate::progress::add_progress_bar;

    use super::colors_enabled;
    use indicatif::{ProgressBar, ProgressStyle};
    use std::io::{stderr, IsTerminal};

    /// Create a progress bar for batch scoring, only if stderr is interactive
    pub fn create_batch_progress_bar(total: usize) -> Option<ProgressBar> {
        if total <= 1 || !stderr().is_terminal() {
            return None;
        }

        let pb = ProgressBar::new(total as u64);
        add_progress_bar(pb.clone());
        let (template, chars) = if colors_enabled() {
            (
                "[{elapsed_precise}] [{bar:30.green/black}] {pos}/{len} ({percent}%) {msg}",
                "█▓▒░",
            )
        } else {
            (
                "[{elapsed_precise}] [{bar:30}] {pos}/{len} ({percent}%) {msg}",
                "#> ",
            )
        };
        if let Ok(style) = ProgressStyle::default_bar().template(template) {
            pb.set_style(style.progress_chars(chars));
        }
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        Some(pb)
    }
}
