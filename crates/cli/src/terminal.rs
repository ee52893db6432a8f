use std::io::Write;

use chatwidget::chat::{EntryChange, MessageKey, Placement, Sender};
use chatwidget::{Anchor, WidgetSurface};

/// Line-oriented surface: one line per entry, streamed replies grow in place.
pub struct TerminalSurface<W: Write> {
    out: W,
    markup: bool,
    thinking: bool,
    input_enabled: bool,
    /// Entry whose line is still open, with the text already written for it.
    open_line: Option<(MessageKey, String)>,
}

impl<W: Write> TerminalSurface<W> {
    pub fn new(out: W, markup: bool) -> Self {
        Self {
            out,
            markup,
            thinking: false,
            input_enabled: true,
            open_line: None,
        }
    }

    /// Input prompt, shown only while the widget accepts input.
    pub fn prompt(&mut self) {
        if self.input_enabled && self.open_line.is_none() {
            self.write("> ");
        }
    }

    fn body<'a>(&self, change: &'a EntryChange) -> &'a str {
        if self.markup {
            change.markup.trim_end()
        } else {
            &change.text
        }
    }

    fn close_line(&mut self) {
        if self.open_line.take().is_some() {
            self.write("\n");
        }
    }

    fn write(&mut self, text: &str) {
        let result = self.out.write_all(text.as_bytes()).and_then(|()| self.out.flush());
        if let Err(error) = result {
            tracing::warn!(error = %error, "failed to write to terminal");
        }
    }

    fn write_line(&mut self, line: &str) {
        self.close_line();
        self.write(line);
        self.write("\n");
    }

    fn start_entry(&mut self, change: &EntryChange) {
        self.close_line();
        let label = match change.sender() {
            Sender::User => "you",
            Sender::System => "bot",
        };
        let body = self.body(change).to_string();
        self.write(&format!("[{}] {label}: {body}", change.time_label));
        self.open_line = Some((change.key, body));
    }
}

impl<W: Write> WidgetSurface for TerminalSurface<W> {
    fn show_panel(&mut self, title: &str, anchor: Option<&Anchor>) {
        if let Some(anchor) = anchor {
            tracing::debug!(anchor = %anchor.id, "panel anchored");
        }
        self.write_line(&format!("== {title} =="));
    }

    fn hide_panel(&mut self) {
        self.write_line("== closed ==");
    }

    fn show_backdrop(&mut self) {}

    fn hide_backdrop(&mut self) {}

    fn set_thinking(&mut self, thinking: bool) {
        if thinking && !self.thinking {
            self.write_line("... thinking");
        }
        self.thinking = thinking;
    }

    fn set_input_enabled(&mut self, enabled: bool) {
        self.input_enabled = enabled;
    }

    fn reset_input(&mut self) {
        self.close_line();
    }

    fn render_entry(&mut self, change: &EntryChange) {
        if change.placement == Placement::Prepended {
            self.start_entry(change);
            return;
        }

        let body = self.body(change).to_string();
        let suffix = match &self.open_line {
            Some((key, written)) if *key == change.key => body.strip_prefix(written.as_str()),
            _ => None,
        };

        match suffix {
            Some(suffix) => {
                let suffix = suffix.to_string();
                self.write(&suffix);
                self.open_line = Some((change.key, body));
            }
            // Not a pure extension of the visible line; print it afresh.
            None => self.start_entry(change),
        }
    }

    fn render_timeline(&mut self, entries: &[EntryChange]) {
        self.close_line();
        for change in entries.iter().rev() {
            self.start_entry(change);
        }
        self.close_line();
    }

    fn alert(&mut self, message: &str) {
        self.write_line(&format!("! {message}"));
    }
}
