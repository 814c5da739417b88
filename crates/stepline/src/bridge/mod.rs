pub mod offload;
pub mod protocol;
pub mod stats_layout;
