pub mod dataset;
pub mod domain;
pub mod harness;
pub mod numerics;
pub mod workspace;
