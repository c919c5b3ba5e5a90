pub mod config;
pub mod extract;
pub mod models;
pub mod outcome;
pub mod reconcile;
pub mod resolve;

pub use extract::Extractor;
pub use outcome::analyze_run;
pub use reconcile::{CommentSource, LabelSource, Plan, reconcile};
