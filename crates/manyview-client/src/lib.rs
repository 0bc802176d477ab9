//! Client runtime for the manyview front-end: connects to the many-core
//! backend, keeps a reconciled [`model::ChipState`] snapshot, and emits
//! [`event::ModelEvent`]s for a view layer to consume.

pub mod config;
pub mod event;
pub mod issuer;
pub mod model;
pub mod output_log;
pub mod reconcile;
pub mod router;
pub mod selections;
pub mod telemetry;
pub mod transport;

pub use config::Config;
pub use event::ModelEvent;
pub use issuer::CommandIssuer;
pub use model::{ChipState, CoreUnit, TaskRecord, TaskStatus};
pub use router::MessageRouter;
pub use transport::Transport;
