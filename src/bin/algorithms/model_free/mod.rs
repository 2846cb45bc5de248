pub mod sac;
