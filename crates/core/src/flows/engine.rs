use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::flows::states::{
    FlowAction, FlowContext, TicketEvent, TicketState, TransitionOutcome,
};

pub trait FlowDefinition {
    fn initial_state(&self) -> TicketState;
    fn transition(
        &self,
        current: &TicketState,
        event: &TicketEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

#[derive(Clone, Debug, Default)]
pub struct TicketLifecycleFlow;

impl FlowDefinition for TicketLifecycleFlow {
    fn initial_state(&self) -> TicketState {
        TicketState::Unopened
    }

    fn transition(
        &self,
        current: &TicketState,
        event: &TicketEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_ticket(current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_state(&self) -> TicketState {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &TicketState,
        event: &TicketEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &TicketState,
        event: &TicketEvent,
        context: &FlowContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit.ticket_id,
                        audit.correlation_id.clone(),
                        "flow.transition_applied",
                        AuditCategory::Flow,
                        audit.actor.clone(),
                        AuditOutcome::Success,
                    )
                    .with_state_change(outcome.from.clone(), outcome.to.clone())
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit.ticket_id,
                        audit.correlation_id.clone(),
                        "flow.transition_rejected",
                        AuditCategory::Flow,
                        audit.actor.clone(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("state", format!("{current:?}"))
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<TicketLifecycleFlow> {
    fn default() -> Self {
        Self::new(TicketLifecycleFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("no review draft to submit from {state:?}")]
    MissingDraft { state: TicketState },
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: TicketState, event: TicketEvent },
}

fn transition_ticket(
    current: &TicketState,
    event: &TicketEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use FlowAction::{
        ClearDraft, CreatePrivateChannel, DirectMessageRequester, EmitReviewLog, FinalizeReview,
        MarkLongWarned, NotifyCloseLog, PostGuidance, PresentConfirmPrompt, RecordResolution,
        RecordTicket, ScheduleChannelDeletion, SendLengthWarning, StoreDraft,
    };
    use TicketEvent::{
        CloseRequested, NotReadySelected, OpenRequested, ReviewMessageReceived, SubmitSelected,
    };
    use TicketState::{
        ClosedAwaitingInput, ClosedDraftPendingConfirm, ClosedReviewed, Open, Unopened,
    };

    let (to, actions) = match (current, event) {
        (Unopened, OpenRequested) => {
            (Open, vec![CreatePrivateChannel, RecordTicket, PostGuidance])
        }
        (Open, CloseRequested) => (
            ClosedAwaitingInput,
            vec![RecordResolution, NotifyCloseLog, DirectMessageRequester, ScheduleChannelDeletion],
        ),
        (ClosedAwaitingInput, ReviewMessageReceived)
        | (ClosedDraftPendingConfirm, ReviewMessageReceived) => {
            if !context.review_is_overlong() {
                (ClosedDraftPendingConfirm, vec![StoreDraft, PresentConfirmPrompt])
            } else if context.review_long_warned {
                (current.clone(), Vec::new())
            } else {
                (current.clone(), vec![MarkLongWarned, SendLengthWarning])
            }
        }
        (ClosedDraftPendingConfirm, NotReadySelected) | (ClosedAwaitingInput, NotReadySelected) => {
            (ClosedAwaitingInput, vec![ClearDraft])
        }
        (ClosedDraftPendingConfirm, SubmitSelected) => {
            (ClosedReviewed, vec![FinalizeReview, EmitReviewLog])
        }
        (ClosedAwaitingInput, SubmitSelected) => {
            return Err(FlowTransitionError::MissingDraft { state: current.clone() });
        }
        _ => {
            return Err(FlowTransitionError::InvalidTransition {
                state: current.clone(),
                event: event.clone(),
            });
        }
    };

    Ok(TransitionOutcome { from: current.clone(), to, event: event.clone(), actions })
}

#[cfg(test)]
mod tests {
    use crate::audit::{AuditContext, InMemoryAuditSink, StateChange};
    use crate::domain::ticket::TicketId;
    use crate::flows::engine::{FlowEngine, FlowTransitionError, TicketLifecycleFlow};
    use crate::flows::states::{FlowAction, FlowContext, TicketEvent, TicketState};

    fn review_context(chars: usize, warned: bool) -> FlowContext {
        FlowContext::review_input(chars, 200, warned)
    }

    #[test]
    fn happy_path_reaches_reviewed() {
        let engine = FlowEngine::new(TicketLifecycleFlow);
        let context = FlowContext::default();

        let opened = engine
            .apply(&engine.initial_state(), &TicketEvent::OpenRequested, &context)
            .expect("unopened -> open");
        assert_eq!(opened.to, TicketState::Open);
        assert!(opened.actions.contains(&FlowAction::PostGuidance));

        let closed = engine
            .apply(&opened.to, &TicketEvent::CloseRequested, &context)
            .expect("open -> closed awaiting input");
        assert_eq!(closed.to, TicketState::ClosedAwaitingInput);
        assert_eq!(closed.actions.last(), Some(&FlowAction::ScheduleChannelDeletion));

        let drafted = engine
            .apply(&closed.to, &TicketEvent::ReviewMessageReceived, &review_context(50, false))
            .expect("awaiting input -> draft pending");
        assert_eq!(drafted.to, TicketState::ClosedDraftPendingConfirm);
        assert_eq!(drafted.actions, vec![FlowAction::StoreDraft, FlowAction::PresentConfirmPrompt]);

        let reviewed = engine
            .apply(&drafted.to, &TicketEvent::SubmitSelected, &context)
            .expect("draft pending -> reviewed");
        assert_eq!(reviewed.to, TicketState::ClosedReviewed);
        assert_eq!(reviewed.actions, vec![FlowAction::FinalizeReview, FlowAction::EmitReviewLog]);
    }

    #[test]
    fn overlong_input_warns_once_per_episode() {
        let engine = FlowEngine::default();

        let first = engine
            .apply(
                &TicketState::ClosedAwaitingInput,
                &TicketEvent::ReviewMessageReceived,
                &review_context(250, false),
            )
            .expect("first overlong message");
        assert_eq!(first.to, TicketState::ClosedAwaitingInput);
        assert_eq!(first.actions, vec![FlowAction::MarkLongWarned, FlowAction::SendLengthWarning]);

        let repeat = engine
            .apply(
                &TicketState::ClosedAwaitingInput,
                &TicketEvent::ReviewMessageReceived,
                &review_context(250, true),
            )
            .expect("repeat overlong message");
        assert_eq!(repeat.to, TicketState::ClosedAwaitingInput);
        assert!(repeat.actions.is_empty());
    }

    #[test]
    fn exactly_max_chars_is_accepted_as_draft() {
        let outcome = FlowEngine::default()
            .apply(
                &TicketState::ClosedAwaitingInput,
                &TicketEvent::ReviewMessageReceived,
                &review_context(200, true),
            )
            .expect("boundary length");
        assert_eq!(outcome.to, TicketState::ClosedDraftPendingConfirm);
    }

    #[test]
    fn not_ready_returns_to_awaiting_input() {
        let outcome = FlowEngine::default()
            .apply(
                &TicketState::ClosedDraftPendingConfirm,
                &TicketEvent::NotReadySelected,
                &FlowContext::default(),
            )
            .expect("draft pending -> awaiting input");
        assert_eq!(outcome.to, TicketState::ClosedAwaitingInput);
        assert_eq!(outcome.actions, vec![FlowAction::ClearDraft]);
    }

    #[test]
    fn submit_without_draft_is_rejected() {
        let error = FlowEngine::default()
            .apply(
                &TicketState::ClosedAwaitingInput,
                &TicketEvent::SubmitSelected,
                &FlowContext::default(),
            )
            .expect_err("no draft to submit");
        assert!(matches!(error, FlowTransitionError::MissingDraft { .. }));
    }

    #[test]
    fn terminal_and_closed_states_reject_further_events() {
        let engine = FlowEngine::default();
        let context = FlowContext::default();

        for event in [
            TicketEvent::SubmitSelected,
            TicketEvent::NotReadySelected,
            TicketEvent::ReviewMessageReceived,
            TicketEvent::CloseRequested,
        ] {
            let error = engine
                .apply(&TicketState::ClosedReviewed, &event, &context)
                .expect_err("reviewed is terminal");
            assert!(matches!(error, FlowTransitionError::InvalidTransition { .. }));
        }

        assert!(engine
            .apply(&TicketState::ClosedAwaitingInput, &TicketEvent::CloseRequested, &context)
            .is_err());
        assert!(engine.apply(&TicketState::Open, &TicketEvent::OpenRequested, &context).is_err());
    }

    #[test]
    fn transition_emits_audit_event() {
        let engine = FlowEngine::default();
        let sink = InMemoryAuditSink::default();

        engine
            .apply_with_audit(
                &TicketState::Open,
                &TicketEvent::CloseRequested,
                &FlowContext::default(),
                &sink,
                &AuditContext::new(Some(TicketId(12)), "req-42", "U-staff"),
            )
            .expect("transition should succeed");

        let _ = engine.apply_with_audit(
            &TicketState::ClosedReviewed,
            &TicketEvent::SubmitSelected,
            &FlowContext::default(),
            &sink,
            &AuditContext::new(Some(TicketId(12)), "req-43", "U-requester"),
        );

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "flow.transition_applied");
        assert_eq!(events[0].ticket_id, Some(TicketId(12)));
        assert_eq!(
            events[0].state_change,
            Some(StateChange { from: TicketState::Open, to: TicketState::ClosedAwaitingInput })
        );
        assert_eq!(events[1].event_type, "flow.transition_rejected");
        assert_eq!(events[1].state_change, None);
        assert_eq!(events[1].metadata.get("state").map(String::as_str), Some("ClosedReviewed"));
        assert_eq!(events[1].correlation_id, "req-43");
    }
}
