//! Test fixtures shared by the torsnif crates.

pub mod torrent;
