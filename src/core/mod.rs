pub mod acquire;
pub mod assemble;
pub mod dsp;
pub mod metronome;
pub mod timing;
pub mod transform;
