#![warn(clippy::pedantic)]
// Don't care enough to fix
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod handler;
pub mod net_util;
pub mod responder;
pub mod scope;
pub mod settings;
