// src/lib.rs

pub mod config;
pub mod depth;
pub mod mesh;
pub mod triangulate;
pub mod utils;
