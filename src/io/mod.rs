//! I/O modules for reading DEMs and polygon layers, and for the workspace
//! and overwrite-policy context that scopes every run

pub mod raster;
pub mod vector;
pub mod workspace;

pub use raster::DemReader;
pub use workspace::{OverwritePolicy, Workspace, WorkspaceGuard};
