pub mod error_classifier;
pub mod validator;

pub use error_classifier::*;
pub use validator::*;
