//! wgpu compute device: adapter setup, kernel pipelines and per-run buffers.

pub mod types;
pub mod init;
pub mod pipelines;
pub mod run;
pub mod info;

pub use types::*;
pub use init::*;
pub use run::*;
pub use info::*;
