pub mod audio;
pub mod bridge;
pub mod config;
pub mod cursor;
pub mod input;
pub mod scheduler;
pub mod session;
pub mod tags;
pub mod typewriter;
pub mod variables;
