use nalgebra as na;
use ndarray as nd;

pub type Vector2f = na::Vector2<f32>;
pub type Matrix6d = na::Matrix6<f64>;

/// Row-major float buffer indexed as (row, col, channel)
pub type Field = nd::Array3<f32>;
