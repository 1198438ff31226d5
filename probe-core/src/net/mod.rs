pub mod io;
pub mod raw_socket;

pub use io::{recv_loop, send_frame, MAX_FRAME_LEN};
pub use raw_socket::{RawIcmp4, RawSocket, RawTcp4};
