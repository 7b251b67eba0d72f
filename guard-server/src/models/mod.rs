//! Request / response models

pub mod admin;
pub mod detection;
pub mod traffic;

pub use admin::*;
pub use detection::*;
pub use traffic::*;
