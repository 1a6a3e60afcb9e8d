pub(crate) mod error_shapes;
pub mod openai;
pub mod upstream;
