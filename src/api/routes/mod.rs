pub mod members;
pub mod products;
