mod config;
mod stream;
mod sync;
mod util;

pub use config::*;
pub use stream::*;
pub use sync::*;
pub use util::*;
