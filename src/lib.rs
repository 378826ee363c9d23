pub mod announce;
pub mod app;
pub mod logwatch;
pub mod status;
