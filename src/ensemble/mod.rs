//! Ensemble methods module
//!
//! - Greedy forward selection over holdout predictions
//! - Weighted-average ensembles of fitted pipelines

mod selection;
mod voting;

pub use selection::{ensemble_predictions, greedy_selection, EnsembleSelection};
pub use voting::{weighted_average, FittedEnsemble};
