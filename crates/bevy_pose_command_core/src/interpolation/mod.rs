pub mod accumulate;
pub mod linear;
