//! Layout sync server: stores each user's layouts and serves them to the
//! `layoutsync-core` HTTP remote store.

pub mod server;
