pub mod config;
pub mod duration;
pub mod flow;
pub mod narrate;
pub mod options;
pub mod selectors;
pub mod session;
pub mod ui;
