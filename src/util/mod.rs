mod copy;
mod fs;
mod lock;
mod mount;
mod mounts;

pub use copy::*;
pub use fs::*;
pub use lock::*;
pub use mount::*;
pub use mounts::*;
