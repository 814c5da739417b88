pub mod clock;
pub mod frame_control;
pub mod integrator;
pub mod interpolation;
pub mod overflow;
pub mod scheduler;
pub mod time;
