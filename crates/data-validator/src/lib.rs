//! Data Validation and Quality Scoring
//!
//! Range checks null out physically impossible values before they reach
//! feature engineering, and the [`QualityScorer`] rates each reading by
//! read success, timing and completeness.

mod error;
mod quality;
mod validator;

pub use error::ValidationError;
pub use quality::{QualityConfig, QualityScore, QualityScorer};
pub use validator::{ValidationConfig, ValidationResult, Validator};
