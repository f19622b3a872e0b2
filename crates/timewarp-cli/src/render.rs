use std::io::IsTerminal;

use anstyle::{AnsiColor, Effects, Style};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

impl OutputStyle {
    fn for_stderr() -> Self {
        if std::io::stderr().is_terminal() {
            Self::Rich
        } else {
            Self::Plain
        }
    }
}

pub(crate) const FAILURE_MESSAGE: &str = "Operation failed. Check the system log for details.";

pub(crate) fn print_error(message: &str) {
    eprintln!("{}", render_error_line(OutputStyle::for_stderr(), message));
}

pub(crate) fn print_failure() {
    print_error(FAILURE_MESSAGE);
}

pub(crate) fn render_error_line(style: OutputStyle, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => colorize(error_style(), message),
    }
}

fn error_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightRed.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}
