pub mod alerts;
pub mod analyzer;
pub mod history;
pub mod notify;
