pub mod assignment;
pub mod lifecycle;
pub mod optimize;
pub mod route;
pub mod selector;
