pub mod interview;
pub mod message;
pub mod report;
pub mod user;
