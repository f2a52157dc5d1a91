use std::io::IsTerminal;

use anstyle::{AnsiColor, Effects, Style};
use freshen_installer::DownloadProgress;
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

pub(crate) fn resolve_output_style(stdout_is_terminal: bool, no_color: bool) -> OutputStyle {
    if stdout_is_terminal && !no_color {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

pub(crate) fn current_output_style() -> OutputStyle {
    resolve_output_style(
        std::io::stdout().is_terminal(),
        std::env::var_os("NO_COLOR").is_some(),
    )
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("{} {message}", status_badge(status)),
    }
}

fn status_badge(status: &str) -> String {
    match status {
        "ok" => "[OK]".to_string(),
        "warn" => "[WARN]".to_string(),
        "error" => "[ERR]".to_string(),
        "step" => "[..]".to_string(),
        other => format!("[{}]", other.to_ascii_uppercase()),
    }
}

pub(crate) fn render_section_header(style: OutputStyle, title: &str) -> Option<String> {
    match style {
        OutputStyle::Plain => None,
        OutputStyle::Rich => Some(colorize(section_style(), &format!("== {title} =="))),
    }
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct TerminalRenderer {
    style: OutputStyle,
}

impl TerminalRenderer {
    pub(crate) fn current() -> Self {
        Self {
            style: current_output_style(),
        }
    }

    pub(crate) fn print_status(self, status: &str, message: &str) {
        println!("{}", render_status_line(self.style, status, message));
    }

    pub(crate) fn print_section(self, title: &str) {
        if let Some(line) = render_section_header(self.style, title) {
            println!("{line}");
        }
    }

    pub(crate) fn print_lines(self, lines: &[String]) {
        for line in lines {
            println!("{line}");
        }
    }

    /// A byte-count bar for the archive download, or nothing at all in plain output. The
    /// bar stays undrawn until the first chunk arrives.
    pub(crate) fn download_progress(self, label: &str) -> TerminalDownloadProgress {
        let progress_bar = (self.style == OutputStyle::Rich).then(|| {
            let progress_bar = ProgressBar::new(0);
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner:.cyan.bold} {msg:<16} [{bar:24.cyan/blue}] {bytes:>10}/{total_bytes:10} {elapsed_precise}",
            ) {
                progress_bar.set_style(style.tick_chars(".:;* ").progress_chars("=>-"));
            }
            progress_bar.set_message(label.to_string());
            progress_bar
        });
        TerminalDownloadProgress { progress_bar }
    }
}

pub(crate) struct TerminalDownloadProgress {
    progress_bar: Option<ProgressBar>,
}

impl DownloadProgress for TerminalDownloadProgress {
    fn on_progress(&self, downloaded: u64, total: Option<u64>) {
        let Some(progress_bar) = &self.progress_bar else {
            return;
        };
        progress_bar.set_length(total.unwrap_or(downloaded).max(downloaded));
        progress_bar.set_position(downloaded);
    }

    fn on_finish(&self) {
        let Some(progress_bar) = &self.progress_bar else {
            return;
        };
        let downloaded = progress_bar.position();
        progress_bar.finish_and_clear();
        println!(
            "{}",
            colorize(
                progress_label_style(),
                &format!("downloaded {}", HumanBytes(downloaded))
            )
        );
    }
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

fn progress_label_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightCyan.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}
