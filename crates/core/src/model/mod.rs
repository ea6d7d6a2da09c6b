pub mod point;
pub mod snapshot;
pub mod value;
