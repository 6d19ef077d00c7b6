pub mod context;
pub mod defaults;
pub mod proctoring;
pub mod report;
pub mod session;
pub mod store;
pub mod time_budget;
