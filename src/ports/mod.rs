//! Ports layer: Trait definitions for external collaborators.
//!
//! Following Hexagonal Architecture, these traits define the boundary between
//! the application and the trained model.

mod model;

pub use model::RiskModel;
