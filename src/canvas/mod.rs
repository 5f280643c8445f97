pub mod chat;
pub mod connections;
pub mod interaction;
pub mod minimap;
pub mod node_store;
pub mod session;
pub mod state;
pub mod surface;
pub mod view_state;

pub use state::{Canvas, CanvasError, TextSelection};
