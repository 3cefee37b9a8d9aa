//! Hit delivery: the serial job queue, the HTTP transport and the sender
//! that decides between sending and storing.

pub mod queue;
pub mod sender;
pub mod transport;

pub use queue::{JobState, TrackerQueue};
pub use sender::{send_offline_hits, SendOutcome, Sender};
pub use transport::{HttpTransport, Transport, TransportError, REQUEST_TIMEOUT};
