pub mod courier;
pub mod delivery;
pub mod event;
pub mod subscription;
