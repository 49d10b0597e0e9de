//! Operator-to-rover control link.
//!
//! roverlink carries controller state from an operator station to a rover
//! over a serial radio modem or, for simulation, a UDP socket pair, and
//! tracks whether the rover is still answering.
//!
//! # Crate Structure
//!
//! - [`transport`]: Byte delivery (radio serial device, UDP)
//! - [`frame`]: Compact and extended wire codecs
//! - [`link`]: Communication manager, heartbeat and link state

/// Re-export transport types.
pub mod transport {
    pub use roverlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use roverlink_frame::*;
}

/// Re-export link types.
pub mod link {
    pub use roverlink_link::*;
}
