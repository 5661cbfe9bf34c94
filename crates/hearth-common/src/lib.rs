pub mod accelerator;
pub mod catalog;
pub mod error;
pub mod generation;
pub mod placement;
pub mod token;

pub use accelerator::AcceleratorPool;
pub use catalog::{ModelCatalog, ModelEntry};
pub use error::{ConfigError, DownloadError, PlacementError};
pub use generation::{GenerationRequest, GenerationResult};
pub use placement::{
    plan, AssignmentMode, DistributionMode, ModelFootprint, ModelPlacement, PlacementPlan,
    PlacementPolicy, Strategy,
};
pub use token::{IssuedToken, TokenError};
