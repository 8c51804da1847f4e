pub mod annotation;
pub mod config;
pub mod error;
pub mod events;
pub mod io;
pub mod playback;
pub mod series;
pub mod trials;

pub use error::{Error, Result};
pub use events::*;
pub use series::*;
pub use trials::*;
