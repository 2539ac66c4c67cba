pub mod health;
pub mod resources;
pub mod watch;
pub mod webhook;
