pub mod cluster_registry;
pub mod event_router;
pub mod observability;
pub mod service_controller;
pub mod state_recorder;
