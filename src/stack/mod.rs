//! Physical description of a chip stack.
//!
//! ```text
//! Dimensions ─┐
//! Material ──► Layer ──► Die ──┐
//!             Channel ─────────┼──► StackDescription (bottom → top)
//! Floorplan ◄─ PowersQueue     │
//! ConventionalHeatSink ────────┘
//! ```

pub mod channel;
pub mod die;
pub mod dimensions;
pub mod floorplan;
pub mod heat_sink;
pub mod layer;
pub mod material;
pub mod powers_queue;
pub mod stack_description;

pub use channel::{Channel, ChannelModel, Coolant, flow_rate_from_ml_per_min};
pub use die::Die;
pub use dimensions::Dimensions;
pub use floorplan::{Floorplan, FloorplanElement};
pub use heat_sink::ConventionalHeatSink;
pub use layer::Layer;
pub use material::{Material, MaterialLibrary};
pub use powers_queue::PowersQueue;
pub use stack_description::{StackDescription, StackElement, StackElementKind};
