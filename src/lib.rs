pub mod command;
pub mod config_loader;
pub mod console;
pub mod handlers;
pub mod logger;
pub mod mapper;
pub mod packet;
pub mod relay;
pub mod session;
pub mod transport;
