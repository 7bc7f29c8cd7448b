//! Thought-card ingestion for one conversation view.
//!
//! The consumer watches tool-call activity in the decoded chat stream. For the
//! `thought_card` tool it accumulates argument text per `toolCallId` (deltas
//! are suffixes of one growing string, a complete call replaces it) and, once
//! the text forms a complete card, dispatches it exactly once into the turn's
//! [`ThoughtCardState`] and [`StepRegistry`].

mod card_state;
mod fragment;
mod registry;

pub use card_state::{CardStatus, FileWriteProgress, StepKind, ThoughtCardState};
pub use fragment::{Fragment, evaluate};
pub use registry::{RegistryEvent, StepRegistry};

use crate::protocol::{CardType, Frame, THOUGHT_CARD_TOOL, ThoughtCard};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnPhase {
    #[default]
    Idle,
    Thinking,
    Executing,
    Complete,
    Error,
}

impl TurnPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, TurnPhase::Complete | TurnPhase::Error)
    }
}

#[derive(Debug, Default)]
struct PendingCall {
    tool_name: String,
    args_text: String,
    settled: bool,
    /// Arguments arrived through `b:`/`c:` frames.
    streamed: bool,
}

#[derive(Debug, Default)]
pub struct ThoughtCardConsumer {
    card: ThoughtCardState,
    registry: StepRegistry,
    phase: TurnPhase,
    calls: HashMap<String, PendingCall>,
}

impl ThoughtCardConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn card(&self) -> &ThoughtCardState {
        &self.card
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// Feeds one decoded protocol frame. Frames other than tool calls and
    /// in-stream errors are ignored.
    pub fn ingest(&mut self, frame: &Frame) {
        match frame {
            Frame::ToolCallStart(start) => {
                self.calls.insert(
                    start.tool_call_id.clone(),
                    PendingCall {
                        tool_name: start.tool_name.clone(),
                        streamed: true,
                        ..PendingCall::default()
                    },
                );
            }
            Frame::ToolCallDelta(delta) => {
                let Some(call) = self.calls.get_mut(&delta.tool_call_id) else {
                    tracing::debug!(id = %delta.tool_call_id, "delta for unknown tool call");
                    return;
                };
                if call.settled {
                    return;
                }
                call.args_text.push_str(&delta.args_text_delta);
                self.evaluate(&delta.tool_call_id);
            }
            Frame::ToolCall(call) => {
                let args_text = call.args_text();
                if let Some(pending) = self.calls.get(&call.tool_call_id) {
                    // The closing frame of a call that was already streamed.
                    // Ids restart every response, so a plain repeat is a new card.
                    if pending.streamed && pending.settled && pending.args_text == args_text {
                        return;
                    }
                }
                self.calls.insert(
                    call.tool_call_id.clone(),
                    PendingCall {
                        tool_name: call.tool_name.clone(),
                        args_text,
                        settled: false,
                        streamed: false,
                    },
                );
                self.evaluate(&call.tool_call_id);
            }
            Frame::Error(message) => self.fail(message.clone()),
            Frame::Text(_) | Frame::Finish(_) => {}
        }
    }

    fn evaluate(&mut self, tool_call_id: &str) {
        let Some(call) = self.calls.get_mut(tool_call_id) else {
            return;
        };
        if call.settled || call.tool_name != THOUGHT_CARD_TOOL {
            return;
        }

        match evaluate(&call.args_text) {
            Fragment::Incomplete => {}
            Fragment::Invalid(reason) => {
                call.settled = true;
                tracing::debug!(id = %tool_call_id, %reason, "dropping malformed thought card");
            }
            Fragment::Card(card) => {
                call.settled = true;
                self.apply(tool_call_id, card);
            }
        }
    }

    fn apply(&mut self, tool_call_id: &str, card: ThoughtCard) {
        // Backends may send several thinking cards for step 1 within one turn,
        // so only a finished turn or later steps mark the previous turn.
        let starts_new_turn = card.card_type == CardType::Thinking
            && card.step == 1
            && (self.phase.is_terminal() || self.registry.steps().any(|(step, _)| step > 1));
        if starts_new_turn {
            tracing::debug!("first step of a new turn; clearing previous thought card");
            self.clear_turn(Some(tool_call_id));
        }

        if self.phase.is_terminal() {
            tracing::debug!(card_type = ?card.card_type, "turn already finished; ignoring card");
            return;
        }

        self.registry.record(&card);

        let meta = card.meta.clone().or_else(|| card.tool_name.clone());
        match card.card_type {
            CardType::Thinking => {
                self.card.show();
                self.card.add_step(StepKind::Thinking, card.content, meta);
                self.phase = TurnPhase::Thinking;
            }
            CardType::Executing => {
                self.card.show();
                self.card.add_step(StepKind::Executing, card.content, meta);
                self.phase = TurnPhase::Executing;
            }
            CardType::Progress => {
                if let Some(progress) = card.progress {
                    self.card.set_progress(progress);
                }
            }
            CardType::LiveText => {
                self.card
                    .set_live_text(card.content, card.is_typing.unwrap_or(true));
            }
            CardType::FileWriting | CardType::FileComplete => {
                self.card.set_file_write(FileWriteProgress {
                    filename: card.filename.unwrap_or_default(),
                    progress: card.progress,
                    complete: card.card_type == CardType::FileComplete,
                });
            }
            CardType::FinalAnswer | CardType::Complete => {
                self.card.show();
                self.card.add_step(StepKind::Complete, card.content, meta);
                self.card.complete();
                self.phase = TurnPhase::Complete;
            }
            CardType::ToolExecution | CardType::ToolResult | CardType::Other => {
                self.card.show();
                self.card.add_step(StepKind::Step, card.content, meta);
            }
        }
    }

    /// Marks the turn failed. Has no effect once the turn has ended.
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.phase.is_terminal() {
            return;
        }
        let message = message.into();
        tracing::debug!(%message, "thought card turn failed");
        self.card.fail(message);
        self.phase = TurnPhase::Error;
    }

    /// Called when the protocol stream ends. A card still processing is
    /// settled as completed.
    pub fn end_of_stream(&mut self) {
        if self.phase.is_terminal() || !self.card.visible() {
            return;
        }
        self.card.complete();
        self.phase = TurnPhase::Complete;
    }

    /// Starts a fresh turn. A no-op when nothing has happened yet.
    pub fn reset(&mut self) {
        if self.phase == TurnPhase::Idle
            && self.card.is_pristine()
            && self.registry.is_empty()
            && self.calls.is_empty()
        {
            return;
        }
        self.clear_turn(None);
    }

    fn clear_turn(&mut self, keep_call: Option<&str>) {
        self.card.reset();
        self.registry.clear();
        self.phase = TurnPhase::Idle;
        match keep_call {
            Some(id) => self.calls.retain(|call_id, _| call_id == id),
            None => self.calls.clear(),
        }
    }
}
