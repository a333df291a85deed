pub mod chat;
pub mod identity;
pub mod quote;
pub mod tender;
