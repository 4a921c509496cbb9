pub mod capture;
pub mod consts;
pub mod error;
pub mod frame;
pub mod io;
pub mod stats;
