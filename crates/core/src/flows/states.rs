use serde::{Deserialize, Serialize};

use crate::desk::DEFAULT_REVIEW_MAX_CHARS;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketState {
    Unopened,
    Open,
    ClosedAwaitingInput,
    ClosedDraftPendingConfirm,
    ClosedReviewed,
    /// Closed without a review ever being collected, e.g. rows written before
    /// review collection existed.
    Archived,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketEvent {
    OpenRequested,
    CloseRequested,
    ReviewMessageReceived,
    NotReadySelected,
    SubmitSelected,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowContext {
    pub review_chars: usize,
    pub review_max_chars: usize,
    pub review_long_warned: bool,
}

impl Default for FlowContext {
    fn default() -> Self {
        Self::review_input(0, DEFAULT_REVIEW_MAX_CHARS, false)
    }
}

impl FlowContext {
    pub fn review_input(chars: usize, max_chars: usize, long_warned: bool) -> Self {
        Self { review_chars: chars, review_max_chars: max_chars, review_long_warned: long_warned }
    }

    pub fn review_is_overlong(&self) -> bool {
        self.review_chars > self.review_max_chars
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    CreatePrivateChannel,
    RecordTicket,
    PostGuidance,
    RecordResolution,
    NotifyCloseLog,
    DirectMessageRequester,
    ScheduleChannelDeletion,
    MarkLongWarned,
    SendLengthWarning,
    StoreDraft,
    PresentConfirmPrompt,
    ClearDraft,
    FinalizeReview,
    EmitReviewLog,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: TicketState,
    pub to: TicketState,
    pub event: TicketEvent,
    pub actions: Vec<FlowAction>,
}
