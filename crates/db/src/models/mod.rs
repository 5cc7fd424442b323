pub mod credit;
pub mod generation;
