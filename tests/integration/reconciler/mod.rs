pub mod common;
pub mod deletion;
pub mod jobs;
pub mod ownership;
pub mod scenarios;
pub mod status_updates;
