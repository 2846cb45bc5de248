pub mod algorithms;
pub mod envs;
pub mod search;
