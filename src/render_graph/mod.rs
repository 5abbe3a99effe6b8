//! Render Graph System
//!
//! Nodes declare typed input and output slots, edges connect them, and the
//! executor runs every node once per frame after all of its producers,
//! splicing in sub-graphs that nodes request while they run.

pub mod context;
pub mod executor;
pub mod graph;
pub mod label;
pub mod node;
pub mod resource;
pub mod slot;

pub use context::*;
pub use executor::*;
pub use graph::*;
pub use label::*;
pub use node::*;
pub use resource::*;
pub use slot::*;
