pub mod bank;
pub mod beats;
pub mod detectors;
pub mod error;
pub mod evaluate;
pub mod features;
pub mod io;
pub mod plot;
pub mod preprocess;
pub mod signal;

#[cfg(test)]
mod testutil;

pub use beats::*;
pub use error::*;
pub use signal::*;
