// Frame sink: client, transports, publisher and events.

pub mod client;
pub mod error;
pub mod events;
pub mod publisher;
pub mod shm;
pub mod transport;
