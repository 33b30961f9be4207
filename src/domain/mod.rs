pub mod agent;
pub mod dispatch;
pub mod graph;
pub mod ids;
pub mod reconcile;
pub mod score;
pub mod status;
