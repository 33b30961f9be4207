pub mod command;
pub mod delta;
pub mod plan;
pub mod reconciler;
pub mod report;
