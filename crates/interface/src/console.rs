//! Console presentation: renders bubbles as wrapped text lines.

use std::cell::RefCell;
use std::io::{self, Write};

use chatbox_core::{
    Delivery, DeliveryAdvancer, InputKind, Message, MessageContainer, NotificationSink, PresentationSink, Responder, Result,
    Sender,
};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::events::PresentationEvent;

/// A rendered bubble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleView {
    pub sender: Sender,
    pub lines: Vec<String>,
}

/// Writes each delivered bubble to `W` and reports it as presented.
///
/// Content is advanced as soon as it has been written. Interaction goes
/// through scripted `respond` events rather than the console.
pub struct ConsoleSink<W: Write> {
    out: RefCell<W>,
    presented: UnboundedSender<PresentationEvent>,
    wrap_width: usize,
}

impl ConsoleSink<io::Stdout> {
    pub fn stdout(presented: UnboundedSender<PresentationEvent>, wrap_width: usize) -> Self {
        Self::with_output(io::stdout(), presented, wrap_width)
    }
}

impl ConsoleSink<Vec<u8>> {
    /// Everything written so far.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.out.borrow()).into_owned()
    }
}

impl<W: Write> ConsoleSink<W> {
    pub fn with_output(out: W, presented: UnboundedSender<PresentationEvent>, wrap_width: usize) -> Self {
        Self {
            out: RefCell::new(out),
            presented,
            wrap_width: wrap_width.max(1),
        }
    }

    fn write_lines(&self, prefix: &str, lines: &[String]) {
        let mut out = self.out.borrow_mut();
        let result = lines
            .iter()
            .try_for_each(|line| writeln!(out, "{prefix}{line}"))
            .and_then(|_| out.flush());
        if let Err(e) = result {
            warn!("Console write failed: {}", e);
        }
    }
}

fn label(actor: &str, sender: Sender) -> String {
    match sender {
        Sender::User => "[you] ".to_string(),
        Sender::Actor => format!("[{actor}] "),
        Sender::Input => format!("[{actor} ?] "),
    }
}

/// Greedy word wrap measured in terminal columns. Words wider than `width`
/// are split.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut current = String::new();
        let mut current_width = 0;
        for word in paragraph.split_whitespace() {
            for piece in split_wide_word(word, width) {
                let piece_width = piece.width();
                if current_width > 0 && current_width + 1 + piece_width > width {
                    lines.push(std::mem::take(&mut current));
                    current_width = 0;
                }
                if current_width > 0 {
                    current.push(' ');
                    current_width += 1;
                }
                current.push_str(&piece);
                current_width += piece_width;
            }
        }
        lines.push(current);
    }
    lines
}

/// Break a word into chunks no wider than `width`. A single character wider
/// than `width` gets a chunk of its own.
fn split_wide_word(word: &str, width: usize) -> Vec<String> {
    if word.width() <= width {
        return vec![word.to_string()];
    }
    let mut pieces = Vec::new();
    let mut piece = String::new();
    let mut piece_width = 0;
    for ch in word.chars() {
        let ch_width = ch.width().unwrap_or(0);
        if piece_width > 0 && piece_width + ch_width > width {
            pieces.push(std::mem::take(&mut piece));
            piece_width = 0;
        }
        piece.push(ch);
        piece_width += ch_width;
    }
    if !piece.is_empty() {
        pieces.push(piece);
    }
    pieces
}

pub fn render_message(message: &Message, wrap_width: usize) -> Vec<String> {
    match message {
        Message::Text(text) => wrap_text(&text.text, text.wrap_width),
        Message::Choice(choice) => {
            let mut lines = if choice.prompt.is_empty() {
                Vec::new()
            } else {
                wrap_text(&choice.prompt, wrap_width)
            };
            lines.extend(
                choice
                    .choices
                    .iter()
                    .enumerate()
                    .map(|(index, option)| format!("  {}) {} [{}]", index + 1, option.label, option.id)),
            );
            lines
        }
        Message::Input(input) => {
            let kind = match input.kind {
                InputKind::Text => "text",
                InputKind::Console => "console",
            };
            vec![format!("> ({kind} input '{}')", input.correlation_id)]
        }
        Message::Attachment(attachment) => vec![format!(
            "[attachment] {} ({})",
            attachment.description,
            attachment.path.display()
        )],
        Message::ExternalEvent => vec!["(waiting for something to happen...)".to_string()],
    }
}

impl<W: Write> PresentationSink for ConsoleSink<W> {
    type View = ConsoleView;

    fn pending_view(&self, actor: &str, sender: Sender) -> ConsoleView {
        ConsoleView {
            sender,
            lines: vec![format!("{actor} is typing...")],
        }
    }

    fn message_view(&self, _actor: &str, container: &MessageContainer, _responder: Responder) -> ConsoleView {
        ConsoleView {
            sender: container.sender(),
            lines: container.with_message(|message| render_message(message, self.wrap_width)),
        }
    }

    fn show_pending(&self, _actor: &str, delivery: Delivery<ConsoleView>) {
        self.write_lines("    ", &delivery.item.lines);
    }

    fn show_content(&self, actor: &str, delivery: Delivery<ConsoleView>, advancer: DeliveryAdvancer) {
        let view = delivery.item;
        self.write_lines(&label(actor, view.sender), &view.lines);
        let event = PresentationEvent::Presented {
            actor: actor.to_string(),
            sender: view.sender,
        };
        if self.presented.send(event).is_err() {
            warn!(actor, "Presentation feedback dropped");
        }
        advancer.advance();
    }
}

/// Reports unread reminders on stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl NotificationSink for ConsoleNotifier {
    fn notify_still_unread(&self, actor: &str) -> Result<()> {
        info!(actor, "Unread reminder");
        let mut err = io::stderr();
        writeln!(err, "({actor} has unread messages)")?;
        Ok(())
    }
}
