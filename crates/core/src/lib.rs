pub mod audit;
pub mod config;
pub mod desk;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod reminders;

pub use audit::{AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use desk::{SupportDesk, TicketStore};
pub use domain::platform::{ChannelId, GuildId, RoleId, UserId};
pub use domain::ticket::{
    FinalReview, NewTicket, Resolution, ReviewProgress, Ticket, TicketCategory, TicketId,
};
pub use errors::TicketError;
pub use flows::{FlowEngine, TicketLifecycleFlow, TicketState};
pub use reminders::ReminderBoard;
