pub mod event;
pub mod ticket;
pub mod user;

pub use event::{Event, NewEvent};
pub use ticket::{
    AttendeeInfo, Availability, NewTicket, Reservation, Ticket, TicketLimit, TicketLimitInput,
    TicketStatus,
};
pub use user::{is_valid_email, NewUser, RefreshSession, Role, User};
