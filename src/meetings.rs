mod id;
mod poll;
mod user;
mod workshop;

pub use id::Id;
pub use poll::{Poll, PollStatus, PollUpdate, Subject};
pub use user::User;
pub use workshop::{Workshop, WorkshopStatus};
