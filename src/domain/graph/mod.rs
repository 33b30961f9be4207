pub mod constraint;
pub mod desired;
pub mod resource;
