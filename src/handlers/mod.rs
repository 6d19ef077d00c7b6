pub mod auth;
pub mod interviews;
pub mod proctor;
pub mod reports;
