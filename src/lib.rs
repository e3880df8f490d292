pub mod config;
pub mod coupling;
pub mod discretization;
pub mod error;
pub mod fsi;
pub mod linalg;
pub mod models;
pub mod numerics;
pub mod physics;
pub mod processing;
