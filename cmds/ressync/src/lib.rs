pub mod config;
pub mod discover;
pub mod sheet;
pub mod sync;
pub mod util;
