pub mod adv;
pub mod container;
pub mod deferred;
pub mod fits;
pub mod fits_cube;
pub mod fits_frame;
pub mod preview;
pub mod ser;
pub mod ser_writer;
pub mod timestamp;

pub use container::{
    inspect, open_container, read_frame, ContainerSpec, ContainerSummary, ContainerWriter,
    SaveFormat,
};
