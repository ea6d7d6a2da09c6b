pub mod points;
pub mod scheduler;
pub mod sink;
pub mod source;
