pub mod alarm;
pub mod submit;
