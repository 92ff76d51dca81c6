pub mod agents;
pub mod error;
pub mod events;
pub mod gateway;
pub mod memory;
pub mod orchestrator;
pub mod sanitize;
pub mod storage;
pub mod tools;
