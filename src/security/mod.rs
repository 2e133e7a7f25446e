pub mod input_validation;
pub mod tools;

pub use input_validation::InputValidator;
pub use tools::validate_binary;
