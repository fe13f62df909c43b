pub mod config;
pub mod console;
pub mod digest;
pub mod limiter;
pub mod logging;
pub mod manager;
pub mod models;
pub mod printer;
pub mod reader;
pub mod status;
pub mod store;
pub mod target;

/// Convenient type alias exposing common structs.
pub mod prelude {
    pub use crate::config::ManagerOptions;
    pub use crate::console::{Console, ConsoleError, Surface, TerminalSize};
    pub use crate::manager::{Handle, Manager, ManagerError};
    pub use crate::models::{Descriptor, Prompts};
    pub use crate::printer::Printer;
    pub use crate::reader::TrackedReader;
    pub use crate::status::{Delivery, Message, StatusLine};
    pub use crate::store::MemoryStore;
    pub use crate::target::{wrap, Content, Target, TrackedStore, TransferError};
}
