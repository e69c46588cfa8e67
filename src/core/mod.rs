pub mod config;
pub mod dispatch;
pub mod hooks;
pub mod lifecycle;
pub mod poller;
pub mod process;
pub mod service;
pub mod state;
pub mod terminal;
