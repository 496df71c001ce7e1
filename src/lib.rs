pub mod config;
pub mod context;
pub mod drag;
pub mod events;
pub mod history;
pub mod settings;
pub mod state;
pub mod tabs;
pub mod ui_thread;
pub mod utils;
pub mod window;
