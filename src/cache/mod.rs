//! Cache transfer engine
//!
//! Moves the contents of BuildKit cache mounts to and from plain host
//! directories by running throwaway builds that copy between the mount and a
//! staging location.
//!
//! # Job lifecycle
//!
//! | State | Entered after |
//! |-------|---------------|
//! | Init | job allocated |
//! | ScratchPrepared | scratch directory recreated |
//! | DefinitionReady | build definition rendered |
//! | BuildExecuted | builder exited 0 |
//! | Relocated | data moved into place |
//! | CleanedUp | scratch, image and container removed |
//! | Failed | any step returned an error |

pub mod coordinator;
pub mod definition;
pub mod job;
pub mod mount;
pub mod relocate;
pub mod transfer;

#[cfg(test)]
pub(crate) mod testing;

pub use coordinator::Coordinator;
pub use job::{job_id, Direction, Job, JobState};
pub use mount::{CacheMount, MountMode, Ownership, Sharing};
pub use relocate::DestinationRemover;
pub use transfer::TransferContext;
