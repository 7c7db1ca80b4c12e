mod direct_message;
mod list;
mod status;
mod user;

pub use direct_message::DirectMessage;
pub use list::UserList;
pub use status::Status;
pub use user::User;
