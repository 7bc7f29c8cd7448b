use crate::client::ChatClient;
use crate::consumer::{
    CardStatus, RegistryEvent, StepKind, StepRegistry, ThoughtCardConsumer, ThoughtCardState,
    TurnPhase,
};
use crate::conversation::{AgentMode, ConversationRequest, Message, Role};
use crate::protocol::Frame;
use crossterm::cursor::MoveTo;
use crossterm::event::{self, Event, KeyCode, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, size};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Paragraph, Widget, Wrap};
use ratatui::{Frame as TuiFrame, Terminal, TerminalOptions, Viewport};
use std::io;
use std::io::Write;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

type TuiTerminal = Terminal<CrosstermBackend<io::Stdout>>;
type UiResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

const INPUT_HEIGHT: u16 = 6;
const CARD_HEIGHT: u16 = 9;

// Restores terminal settings even if the loop exits early.
struct TerminalGuard;

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = io::stdout().flush();
    }
}

#[derive(Debug, Clone)]
enum ChatMessage {
    User(String),
    Assistant(String),
    Thoughts(Vec<String>),
    Info(String),
}

impl ChatMessage {
    fn to_text(&self) -> Text<'static> {
        let (header, body, color) = match self {
            ChatMessage::User(msg) => (Some("You:"), msg.lines().collect::<Vec<_>>(), Color::Blue),
            ChatMessage::Assistant(msg) => {
                (Some("Agent:"), msg.lines().collect::<Vec<_>>(), Color::Yellow)
            }
            ChatMessage::Thoughts(lines) => (
                Some("Thoughts:"),
                lines.iter().map(String::as_str).collect(),
                Color::Green,
            ),
            ChatMessage::Info(msg) => {
                return Text::from(Span::styled(
                    format!("ℹ {}", msg),
                    Style::default()
                        .fg(Color::Gray)
                        .add_modifier(Modifier::ITALIC),
                ));
            }
        };

        let mut lines = Vec::new();
        if let Some(header) = header {
            lines.push(Line::from(Span::styled(
                header,
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            )));
        }
        for line in body {
            lines.push(Line::from(Span::styled(
                format!("  {}", line),
                Style::default().fg(color),
            )));
        }
        Text::from(lines)
    }

    fn rendered_height(&self, width: u16) -> u16 {
        let width = width.max(1) as usize;
        self.to_text()
            .lines
            .iter()
            .map(|line| line.width().max(1).div_ceil(width))
            .sum::<usize>() as u16
    }
}

/// Events from a running turn, tagged with the turn that produced them.
#[derive(Debug)]
enum UiEvent {
    Frame(u64, Frame),
    Done(u64),
    Error(u64, String),
}

impl UiEvent {
    fn turn_id(&self) -> u64 {
        match self {
            UiEvent::Frame(id, _) | UiEvent::Done(id) | UiEvent::Error(id, _) => *id,
        }
    }
}

/// Multi-line input with a char-indexed cursor.
struct InputBuffer {
    lines: Vec<String>,
    cursor_x: usize,
    cursor_y: usize,
}

impl InputBuffer {
    fn new() -> Self {
        Self {
            lines: vec![String::new()],
            cursor_x: 0,
            cursor_y: 0,
        }
    }

    fn clear(&mut self) {
        *self = Self::new();
    }

    fn line_len(&self, y: usize) -> usize {
        self.lines[y].chars().count()
    }

    fn byte_offset(&self) -> usize {
        let line = &self.lines[self.cursor_y];
        line.char_indices()
            .nth(self.cursor_x)
            .map(|(idx, _)| idx)
            .unwrap_or(line.len())
    }

    fn insert_char(&mut self, c: char) {
        let offset = self.byte_offset();
        self.lines[self.cursor_y].insert(offset, c);
        self.cursor_x += 1;
    }

    fn delete_char(&mut self) {
        if self.cursor_x > 0 {
            self.cursor_x -= 1;
            let offset = self.byte_offset();
            self.lines[self.cursor_y].remove(offset);
        } else if self.cursor_y > 0 {
            let tail = self.lines.remove(self.cursor_y);
            self.cursor_y -= 1;
            self.cursor_x = self.line_len(self.cursor_y);
            self.lines[self.cursor_y].push_str(&tail);
        }
    }

    fn new_line(&mut self) {
        let offset = self.byte_offset();
        let tail = self.lines[self.cursor_y].split_off(offset);
        self.lines.insert(self.cursor_y + 1, tail);
        self.cursor_y += 1;
        self.cursor_x = 0;
    }

    fn move_left(&mut self) {
        if self.cursor_x > 0 {
            self.cursor_x -= 1;
        } else if self.cursor_y > 0 {
            self.cursor_y -= 1;
            self.cursor_x = self.line_len(self.cursor_y);
        }
    }

    fn move_right(&mut self) {
        if self.cursor_x < self.line_len(self.cursor_y) {
            self.cursor_x += 1;
        } else if self.cursor_y + 1 < self.lines.len() {
            self.cursor_y += 1;
            self.cursor_x = 0;
        }
    }

    fn move_vertical(&mut self, down: bool) {
        let target = if down {
            (self.cursor_y + 1).min(self.lines.len() - 1)
        } else {
            self.cursor_y.saturating_sub(1)
        };
        self.cursor_y = target;
        self.cursor_x = self.cursor_x.min(self.line_len(target));
    }

    fn text(&self) -> String {
        self.lines.join("\n")
    }

    fn is_blank(&self) -> bool {
        self.lines.iter().all(|l| l.trim().is_empty())
    }

    fn render(&self) -> Text<'static> {
        if self.lines.iter().all(String::is_empty) {
            return Text::from(Span::styled(
                "Ask the research agent...",
                Style::default().fg(Color::DarkGray),
            ));
        }
        Text::from(
            self.lines
                .iter()
                .map(|l| Line::from(l.clone()))
                .collect::<Vec<_>>(),
        )
    }
}

fn step_marker(kind: StepKind) -> &'static str {
    match kind {
        StepKind::Thinking => "💭",
        StepKind::Executing => "🔧",
        StepKind::Complete => "🎯",
        StepKind::Step => "•",
    }
}

/// Plain-text view of the thought card, newest steps last.
fn card_lines(card: &ThoughtCardState, max_steps: usize) -> Vec<String> {
    let mut lines = Vec::new();

    let skipped = card.steps().len().saturating_sub(max_steps);
    if skipped > 0 {
        lines.push(format!("… {} earlier steps", skipped));
    }
    for step in card.steps().iter().skip(skipped) {
        let mut line = format!("{} {}", step_marker(step.kind), step.text);
        if let Some(meta) = &step.meta {
            line.push_str(&format!(" ({})", meta));
        }
        lines.push(line);
    }

    if let Some(progress) = card.progress() {
        lines.push(format!("progress {:.0}%", progress * 100.0));
    }
    if let Some(file) = card.file_write() {
        let state = if file.complete { "saved" } else { "writing" };
        match file.progress {
            Some(progress) => lines.push(format!(
                "📄 {} {} ({:.0}%)",
                state,
                file.filename,
                progress * 100.0
            )),
            None => lines.push(format!("📄 {} {}", state, file.filename)),
        }
    }
    if !card.live_text().is_empty() {
        let cursor = if card.is_typing() { "▌" } else { "" };
        lines.push(format!("✎ {}{}", card.live_text(), cursor));
    }
    if let Some(error) = card.error() {
        lines.push(format!("error: {}", error));
    }

    lines
}

/// Per-step summary written to scrollback once a turn ends.
fn registry_lines(registry: &StepRegistry) -> Vec<String> {
    let mut lines = Vec::new();
    for (step, record) in registry.steps() {
        lines.push(format!("step {}", step));
        if let Some(thinking) = &record.thinking {
            lines.push(format!("  {} {}", step_marker(StepKind::Thinking), thinking.content));
        }
        if let Some(execution) = &record.tool_execution {
            let tool = execution.tool_name.as_deref().unwrap_or("tool");
            lines.push(format!("  {} {}: {}", step_marker(StepKind::Executing), tool, execution.content));
        }
        if let Some(result) = &record.tool_result {
            lines.push(format!("  → {}", truncate(&result.content, 160)));
        }
    }
    lines
}

fn truncate(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((end, _)) => format!("{}…", &value[..end]),
        None => value.to_string(),
    }
}

fn card_title(card: &ThoughtCardState, phase: TurnPhase, step: Option<u32>) -> String {
    let mut status = match card.status() {
        CardStatus::Processing if phase == TurnPhase::Executing => "running tool".to_string(),
        CardStatus::Processing => "thinking".to_string(),
        CardStatus::Completed => "done".to_string(),
        CardStatus::Error => "failed".to_string(),
    };
    if let (CardStatus::Processing, Some(step)) = (card.status(), step) {
        status.push_str(&format!(" · step {}", step));
    }
    match card.elapsed() {
        Some(elapsed) => format!(" Thoughts [{} · {:.1}s] ", status, elapsed.as_secs_f32()),
        None => format!(" Thoughts [{}] ", status),
    }
}

pub struct App {
    messages: Vec<ChatMessage>,
    input: InputBuffer,
    should_quit: bool,
    sender: mpsc::Sender<UiEvent>,
    receiver: mpsc::Receiver<UiEvent>,
    client: ChatClient,
    mode: AgentMode,
    system: Option<String>,
    conversation: Vec<Message>,
    consumer: ThoughtCardConsumer,
    pending_text: String,
    turn: Option<JoinHandle<()>>,
    turn_id: u64,
    registry_events: broadcast::Receiver<RegistryEvent>,
    active_step: Option<u32>,
    dirty: bool,
    drawn_revision: Option<u64>,
}

impl App {
    pub fn new(client: ChatClient, mode: AgentMode, system: Option<String>) -> Self {
        let (sender, receiver) = mpsc::channel(256);
        let consumer = ThoughtCardConsumer::new();
        let registry_events = consumer.registry().subscribe();

        Self {
            messages: Vec::new(),
            input: InputBuffer::new(),
            should_quit: false,
            sender,
            receiver,
            client,
            mode,
            system,
            conversation: Vec::new(),
            consumer,
            pending_text: String::new(),
            turn: None,
            turn_id: 0,
            registry_events,
            active_step: None,
            dirty: true,
            drawn_revision: None,
        }
    }

    /// Follows registry changes so the title tracks the step in progress.
    fn sync_registry(&mut self) {
        loop {
            match self.registry_events.try_recv() {
                Ok(RegistryEvent::Step(step)) => self.active_step = Some(step),
                Ok(RegistryEvent::FinalAnswer) => {}
                Ok(RegistryEvent::Cleared) => self.active_step = None,
                Err(broadcast::error::TryRecvError::Lagged(_)) => {
                    self.active_step = self.consumer.registry().steps().last().map(|(step, _)| step);
                }
                Err(_) => break,
            }
            self.dirty = true;
        }
    }

    /// A running turn redraws every tick to keep the elapsed time moving.
    fn needs_redraw(&self) -> bool {
        self.dirty
            || self.is_loading()
            || self.drawn_revision != Some(self.consumer.card().revision())
    }

    fn mark_drawn(&mut self) {
        self.dirty = false;
        self.drawn_revision = Some(self.consumer.card().revision());
    }

    fn is_loading(&self) -> bool {
        self.turn.is_some()
    }

    fn draw(&mut self, f: &mut TuiFrame) {
        let [card_area, input_area] =
            Layout::vertical([Constraint::Length(CARD_HEIGHT), Constraint::Min(INPUT_HEIGHT)])
                .areas(f.area());

        let card = self.consumer.card();
        let body = if card.visible() {
            let mut lines = card_lines(card, (CARD_HEIGHT as usize).saturating_sub(4));
            if !self.pending_text.is_empty() {
                lines.push(format!("» {}", self.pending_text.replace('\n', " ")));
            }
            Text::from(lines.into_iter().map(Line::from).collect::<Vec<_>>())
        } else if self.is_loading() {
            Text::from(format!("» {}", self.pending_text.replace('\n', " ")))
        } else {
            Text::from(Span::styled(
                format!("connected to {}", self.client.base_url()),
                Style::default().fg(Color::DarkGray),
            ))
        };
        let title = if card.visible() {
            card_title(card, self.consumer.phase(), self.active_step)
        } else {
            " Thoughts ".to_string()
        };
        f.render_widget(
            Paragraph::new(body)
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .title(title)
                        .border_style(Style::default().fg(Color::Green)),
                )
                .wrap(Wrap { trim: false }),
            card_area,
        );

        let title = if self.is_loading() {
            " Input (Esc to stop) [Working...] "
        } else {
            " Input (Enter to send, Shift+Enter for newline, Esc to quit) "
        };
        let input_paragraph = Paragraph::new(self.input.render())
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(title)
                    .border_style(Style::default().fg(Color::DarkGray)),
            )
            .wrap(Wrap { trim: false });
        f.render_widget(input_paragraph, input_area);

        let x = (input_area.x + 1 + self.input.cursor_x as u16)
            .min(input_area.x + input_area.width.saturating_sub(2));
        let y = (input_area.y + 1 + self.input.cursor_y as u16)
            .min(input_area.y + input_area.height.saturating_sub(2));
        f.set_cursor_position((x, y));
    }

    fn append_message(&mut self, terminal: &mut TuiTerminal, message: ChatMessage) -> UiResult<()> {
        let width = terminal.size()?.width;
        let height = message.rendered_height(width).saturating_add(1);
        let mut text = message.to_text();
        text.extend(Text::raw("\n"));
        // Insert above the inline viewport so the log stays in scrollback.
        terminal.insert_before(height, |buf| {
            let paragraph = Paragraph::new(text).wrap(Wrap { trim: false });
            paragraph.render(buf.area, buf);
        })?;
        self.messages.push(message);
        Ok(())
    }

    fn submit(&mut self, terminal: &mut TuiTerminal) -> UiResult<()> {
        let text = self.input.text();
        self.input.clear();
        self.append_message(terminal, ChatMessage::User(text.clone()))?;

        self.consumer.reset();
        self.pending_text.clear();
        self.conversation.push(Message::text(Role::User, text));

        let request = ConversationRequest {
            messages: self.conversation.clone(),
            system: self.system.clone(),
            tools: None,
            agent_mode: self.mode,
            settings: Default::default(),
        };
        self.turn_id += 1;
        let turn_id = self.turn_id;
        let client = self.client.clone();
        let sender = self.sender.clone();
        self.turn = Some(tokio::spawn(async move {
            let frames = sender.clone();
            let result = client
                .stream_chat(&request, |frame| {
                    let frames = frames.clone();
                    async move {
                        let _ = frames.send(UiEvent::Frame(turn_id, frame)).await;
                    }
                })
                .await;
            let event = match result {
                Ok(()) => UiEvent::Done(turn_id),
                Err(err) => UiEvent::Error(turn_id, err.to_string()),
            };
            let _ = sender.send(event).await;
        }));
        Ok(())
    }

    fn finish_turn(&mut self, terminal: &mut TuiTerminal, error: Option<String>) -> UiResult<()> {
        match &error {
            Some(message) => self.consumer.fail(message.clone()),
            None => self.consumer.end_of_stream(),
        }

        let card = self.consumer.card();
        let registry = self.consumer.registry();
        if !card.steps().is_empty() {
            let mut lines = if registry.steps().next().is_some() {
                registry_lines(registry)
            } else {
                card_lines(card, usize::MAX)
            };
            if let Some(elapsed) = card.elapsed() {
                lines.push(format!("({:.1}s)", elapsed.as_secs_f32()));
            }
            self.append_message(terminal, ChatMessage::Thoughts(lines))?;
        }

        let mut reply = std::mem::take(&mut self.pending_text);
        if reply.is_empty() {
            if let Some(answer) = self.consumer.registry().final_answer() {
                reply = answer.content.clone();
            }
        }
        if !reply.is_empty() {
            self.conversation.push(Message::text(Role::Assistant, reply.clone()));
            self.append_message(terminal, ChatMessage::Assistant(reply))?;
        }
        if let Some(message) = error {
            self.append_message(terminal, ChatMessage::Info(format!("Error: {}", message)))?;
        }

        self.turn = None;
        Ok(())
    }

    fn cancel_turn(&mut self, terminal: &mut TuiTerminal) -> UiResult<()> {
        if let Some(turn) = self.turn.take() {
            // Dropping the request closes the stream on the translator side.
            turn.abort();
            self.finish_turn(terminal, Some("cancelled".to_string()))?;
        }
        Ok(())
    }

    fn handle_events(&mut self, terminal: &mut TuiTerminal) -> UiResult<bool> {
        while let Ok(event) = self.receiver.try_recv() {
            self.dirty = true;
            let current = self.turn.is_some() && self.turn_id == event.turn_id();
            if !current {
                // Leftovers from a cancelled turn.
                continue;
            }
            match event {
                UiEvent::Frame(_, frame) => {
                    if let Frame::Text(text) = &frame {
                        self.pending_text.push_str(text);
                    }
                    self.consumer.ingest(&frame);
                }
                UiEvent::Done(_) => self.finish_turn(terminal, None)?,
                UiEvent::Error(_, err) => self.finish_turn(terminal, Some(err))?,
            }
        }
        self.sync_registry();

        if event::poll(Duration::from_millis(50))? {
            let event = event::read()?;
            self.dirty = true;
            if let Event::Key(key) = event {
                if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c')
                {
                    self.should_quit = true;
                    return Ok(false);
                }

                match key.code {
                    KeyCode::Esc if self.is_loading() => self.cancel_turn(terminal)?,
                    KeyCode::Esc => {
                        self.should_quit = true;
                        return Ok(false);
                    }
                    KeyCode::Enter if key.modifiers.contains(KeyModifiers::SHIFT) => {
                        self.input.new_line();
                    }
                    KeyCode::Enter => {
                        if !self.is_loading() && !self.input.is_blank() {
                            self.submit(terminal)?;
                        }
                    }
                    KeyCode::Char(c) => self.input.insert_char(c),
                    KeyCode::Backspace => self.input.delete_char(),
                    KeyCode::Left => self.input.move_left(),
                    KeyCode::Right => self.input.move_right(),
                    KeyCode::Up => self.input.move_vertical(false),
                    KeyCode::Down => self.input.move_vertical(true),
                    KeyCode::Home => self.input.cursor_x = 0,
                    KeyCode::End => self.input.cursor_x = self.input.line_len(self.input.cursor_y),
                    _ => {}
                }
            }
        }

        Ok(true)
    }
}

pub fn run_tui(client: ChatClient, mode: AgentMode, system: Option<String>) -> UiResult<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    let (_, rows) = size()?;
    if rows > 0 {
        // Push existing screen content into scrollback without clearing it.
        for _ in 0..rows {
            writeln!(stdout)?;
        }
        stdout.flush()?;
    }
    execute!(stdout, MoveTo(0, 0))?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::with_options(
        backend,
        TerminalOptions {
            viewport: Viewport::Inline(CARD_HEIGHT + INPUT_HEIGHT),
        },
    )?;

    let mut app = App::new(client, mode, system);
    let _guard = TerminalGuard;

    terminal.draw(|f| app.draw(f))?;
    app.mark_drawn();

    while !app.should_quit {
        if !app.handle_events(&mut terminal)? {
            break;
        }
        if app.needs_redraw() {
            terminal.draw(|f| app.draw(f))?;
            app.mark_drawn();
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    if let Some(turn) = app.turn.take() {
        turn.abort();
    }

    disable_raw_mode()?;
    io::stdout().flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientConfig;
    use crate::protocol::{THOUGHT_CARD_TOOL, ToolCall};
    use serde_json::{Value, json};

    fn card_frame(id: &str, card: Value) -> Frame {
        Frame::ToolCall(ToolCall {
            tool_call_id: id.to_string(),
            tool_name: THOUGHT_CARD_TOOL.to_string(),
            args: Value::String(card.to_string()),
        })
    }

    fn idle_app() -> App {
        let client = ChatClient::new(ClientConfig {
            base_url: "http://127.0.0.1:3000".to_string(),
        });
        App::new(client, AgentMode::Auto, None)
    }

    #[test]
    fn input_buffer_shift_enter_inserts_new_line() {
        let mut buffer = InputBuffer::new();
        for ch in "hello".chars() {
            buffer.insert_char(ch);
        }
        buffer.new_line();
        for ch in "world".chars() {
            buffer.insert_char(ch);
        }

        assert_eq!(buffer.text(), "hello\nworld");
        assert_eq!(buffer.lines.len(), 2);
        assert_eq!(buffer.cursor_y, 1);
    }

    #[test]
    fn input_buffer_edits_multibyte_text() {
        let mut buffer = InputBuffer::new();
        for ch in "café".chars() {
            buffer.insert_char(ch);
        }
        buffer.move_left();
        buffer.insert_char('x');
        assert_eq!(buffer.text(), "cafxé");

        buffer.move_right();
        buffer.delete_char();
        assert_eq!(buffer.text(), "cafx");

        buffer.cursor_x = 2;
        buffer.new_line();
        assert_eq!(buffer.text(), "ca\nfx");
        buffer.delete_char();
        assert_eq!(buffer.text(), "cafx");
        assert_eq!(buffer.cursor_x, 2);
    }

    #[test]
    fn card_lines_show_recent_steps_and_progress() {
        let mut consumer = ThoughtCardConsumer::new();
        for (index, card) in [
            json!({"card_type": "thinking", "step": 1, "content": "Plan"}),
            json!({"card_type": "executing", "step": 1, "content": "Search", "tool_name": "web_search"}),
            json!({"card_type": "thinking", "step": 2, "content": "Read results"}),
            json!({"card_type": "file_writing", "step": 2, "content": "", "filename": "notes.md", "progress": 0.25}),
            json!({"card_type": "live_text", "step": 2, "content": "Draft", "is_typing": true}),
        ]
        .into_iter()
        .enumerate()
        {
            consumer.ingest(&card_frame(&format!("thought_{}", index), card));
        }

        let lines = card_lines(consumer.card(), 2);
        assert_eq!(
            lines,
            vec![
                "… 1 earlier steps".to_string(),
                "🔧 Search (web_search)".to_string(),
                "💭 Read results".to_string(),
                "📄 writing notes.md (25%)".to_string(),
                "✎ Draft▌".to_string(),
            ]
        );
        assert!(card_title(consumer.card(), consumer.phase(), Some(2)).contains("thinking · step 2"));
    }

    #[test]
    fn registry_lines_group_cards_by_step() {
        let mut consumer = ThoughtCardConsumer::new();
        for (index, card) in [
            json!({"card_type": "thinking", "step": 1, "content": "Plan"}),
            json!({"card_type": "tool_execution", "step": 1, "content": "Executing", "tool_name": "case_study_lookup"}),
            json!({"card_type": "tool_result", "step": 1, "content": "r".repeat(200)}),
            json!({"card_type": "final_answer", "step": 2, "content": "Answer"}),
        ]
        .into_iter()
        .enumerate()
        {
            consumer.ingest(&card_frame(&format!("thought_{}", index), card));
        }

        let lines = registry_lines(consumer.registry());
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "step 1");
        assert_eq!(lines[1], "  💭 Plan");
        assert_eq!(lines[2], "  🔧 case_study_lookup: Executing");
        assert!(lines[3].ends_with('…'));
        assert_eq!(truncate("short", 160), "short");
    }

    #[test]
    fn registry_events_drive_the_title_and_redraws() {
        let mut app = idle_app();
        app.sync_registry();
        app.mark_drawn();
        assert!(!app.needs_redraw());

        app.consumer
            .ingest(&card_frame("thought_0", json!({"card_type": "thinking", "step": 1, "content": "Plan"})));
        assert!(app.needs_redraw());
        app.sync_registry();
        assert_eq!(app.active_step, Some(1));
        app.mark_drawn();
        assert!(!app.needs_redraw());

        app.consumer.ingest(&card_frame(
            "thought_1",
            json!({"card_type": "executing", "step": 2, "content": "Search", "tool_name": "web_search"}),
        ));
        app.sync_registry();
        assert_eq!(app.active_step, Some(2));
        let title = card_title(app.consumer.card(), app.consumer.phase(), app.active_step);
        assert!(title.contains("running tool · step 2"));

        app.consumer.reset();
        app.sync_registry();
        assert_eq!(app.active_step, None);
        assert!(app.needs_redraw());
    }

    #[test]
    fn message_height_accounts_for_wrapping() {
        let message = ChatMessage::User("x".repeat(25));
        // Header line plus "  " + 25 chars wrapped at 10 columns.
        assert_eq!(message.rendered_height(10), 1 + 3);
    }
}
