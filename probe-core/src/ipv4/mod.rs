pub mod header;

pub use header::{IpProtocol, Ipv4Flags, Ipv4Header, FIXED_HEADER_LEN};
