pub mod env;
pub mod synthetic_grid;
