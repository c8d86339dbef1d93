pub mod campaign;
pub mod conversation;
pub mod submission;
