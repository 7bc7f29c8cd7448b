use crate::protocol::{CardType, ThoughtCard};
use std::collections::BTreeMap;
use tokio::sync::broadcast;

/// Partial data collected for one agent step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepRecord {
    pub thinking: Option<ThoughtCard>,
    pub tool_execution: Option<ThoughtCard>,
    pub tool_result: Option<ThoughtCard>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryEvent {
    Step(u32),
    FinalAnswer,
    Cleared,
}

/// Per-step projection of the thought cards seen in a turn, keyed by step
/// number, with a separate slot for the final answer.
#[derive(Debug)]
pub struct StepRegistry {
    steps: BTreeMap<u32, StepRecord>,
    final_answer: Option<ThoughtCard>,
    events: broadcast::Sender<RegistryEvent>,
}

impl StepRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            steps: BTreeMap::new(),
            final_answer: None,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Stores the card in its slot. Card types without a slot are ignored.
    pub fn record(&mut self, card: &ThoughtCard) -> bool {
        let event = match card.card_type {
            CardType::FinalAnswer => {
                self.final_answer = Some(card.clone());
                RegistryEvent::FinalAnswer
            }
            CardType::Thinking | CardType::Executing | CardType::ToolExecution | CardType::ToolResult => {
                let record = self.steps.entry(card.step).or_default();
                let slot = match card.card_type {
                    CardType::Thinking => &mut record.thinking,
                    CardType::ToolResult => &mut record.tool_result,
                    _ => &mut record.tool_execution,
                };
                *slot = Some(card.clone());
                RegistryEvent::Step(card.step)
            }
            _ => return false,
        };

        // No subscribers is fine.
        let _ = self.events.send(event);
        true
    }

    pub fn clear(&mut self) {
        if self.is_empty() {
            return;
        }
        self.steps.clear();
        self.final_answer = None;
        let _ = self.events.send(RegistryEvent::Cleared);
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty() && self.final_answer.is_none()
    }

    pub fn get(&self, step: u32) -> Option<&StepRecord> {
        self.steps.get(&step)
    }

    pub fn steps(&self) -> impl Iterator<Item = (u32, &StepRecord)> {
        self.steps.iter().map(|(step, record)| (*step, record))
    }

    pub fn final_answer(&self) -> Option<&ThoughtCard> {
        self.final_answer.as_ref()
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}
