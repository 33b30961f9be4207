pub mod audit;
pub mod connection;
pub mod dispatcher;
pub mod remote_api;
