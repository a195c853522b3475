pub mod bounds;
pub mod batch;
pub mod decision;
pub mod error;
pub mod one_sample;
pub mod params;
pub mod sample_size;
pub mod simulation;
pub mod two_sample;
