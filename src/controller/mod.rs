//! # Controller
//!
//! Everything between the Kubernetes watch and the cluster: the application
//! store, the status write path, the job engine, the state machines and the
//! reconciler.

pub mod events;
pub mod fsm;
pub mod job;
pub mod reconciler;
pub mod status;
pub mod store;
pub mod sync;
