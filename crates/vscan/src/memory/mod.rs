pub mod error;
pub mod image;
pub mod layers;
pub mod mapping;
pub mod traits;
pub mod translators;
