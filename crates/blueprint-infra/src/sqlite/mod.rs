//! SQLite storage via sqlx, with sqlite-vec supplying the vector distance functions.

pub mod blueprint;
pub mod pool;
pub mod vector;
