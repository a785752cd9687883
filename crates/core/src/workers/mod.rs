pub mod consumer;
pub mod rotate_image;
pub mod worker;

pub use consumer::*;
pub use rotate_image::*;
pub use worker::*;
