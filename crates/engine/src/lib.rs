pub mod dispatcher;
pub mod memory;
pub mod pg_store;
pub mod push_service;
pub mod queue;
pub mod recipient_service;
pub mod report_service;
pub mod resolver;
pub mod retraction;
pub mod scheduler;
pub mod selector;
pub mod state;
pub mod store;
