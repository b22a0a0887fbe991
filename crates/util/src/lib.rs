//! Thread plumbing shared by the replay crates: a single producer single
//! consumer queue and a join-on-drop thread handle.

pub mod channels;
pub mod drop_join_thread;
