pub mod events;
mod service;
pub mod users;

pub use events::{Event, EventInput};
pub use service::DbService;
pub use users::{NewUser, OAuthProvider, User};
