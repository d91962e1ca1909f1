pub mod chat;
pub mod configure;
pub mod tools;
