//! Deflate-rate analysis for the LUT-driven valve PWM.

pub mod deflate;
