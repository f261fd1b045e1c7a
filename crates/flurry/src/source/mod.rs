//! Remote side of a poller: what lives in the bucket and how to reach it.

mod client;
mod listing;
mod object;

pub use client::RemoteStore;
pub use listing::RemoteObjectLister;
pub use object::RemoteObjectRef;
