pub mod boot;
pub mod clock;
pub mod motion;
pub mod sleep;
