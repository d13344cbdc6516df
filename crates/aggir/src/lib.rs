//! AGGIR autonomy assessment core.
//!
//! Turns four-adverb clinical answers into letter codes, classifies the eight
//! discriminant variables into a GIR level, and manages assessments that are
//! filled in across several (possibly offline) field sessions.

pub mod assessments;
pub mod classification;
pub mod config;
pub mod error;
pub mod grid;
pub mod telemetry;
