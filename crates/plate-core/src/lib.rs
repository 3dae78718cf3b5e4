mod core;
pub mod html;
mod listener;
mod ops;
mod plugin;
mod state;

pub use crate::core::*;
pub use crate::listener::*;
pub use crate::ops::*;
pub use crate::plugin::*;
pub use crate::state::*;
