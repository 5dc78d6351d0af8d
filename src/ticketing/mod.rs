//! Remote ticketing API: wire types, transport, and the retrying client.

pub mod api_types;
pub mod client;
pub mod transport;
pub mod types;

pub use client::{RetryPolicy, TicketingClient};
pub use transport::{HttpTransport, Transport};
