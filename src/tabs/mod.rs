//! Singleton application tab tracking.
//!
//! - [`monitor`] reconciles the tab records against host tab events
//! - [`activation`] shows the application, creating its tab when needed

mod activation;
mod monitor;

pub use activation::ActivationController;
pub use monitor::{ApplicationUrls, TabLifecycleMonitor};
