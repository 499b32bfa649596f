pub mod audio;
pub mod events;
pub mod items;
pub mod session;
pub mod tools;

pub use events::{ClientEvent, ServerEvent};
pub use items::{Item, ItemResource};
pub use session::SessionConfig;
