pub mod application;
pub mod core;
pub mod marks;
pub mod pages;
