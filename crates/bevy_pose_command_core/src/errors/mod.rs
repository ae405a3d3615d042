mod arena_error;
mod command_error;
mod evaluation_error;
mod modifier_error;
mod skeleton_error;

pub use arena_error::*;
pub use command_error::*;
pub use evaluation_error::*;
pub use modifier_error::*;
pub use skeleton_error::*;
