// GB28181 SIP 信令（设备侧）

pub mod builder;
pub mod digest;
pub mod manscdp;
pub mod message;
pub mod sdp;

pub use builder::{Endpoint, RegisterAuth};
pub use manscdp::ManscdpQuery;
pub use message::{SipMessage, SipMethod, StartLine};
pub use sdp::SdpOffer;
