pub mod exports;
pub mod helpers;
pub mod model;
pub mod replay_buffer;
pub mod target_network;
