// flexlisten-api: Wire protocol and transport for FlexRadio discovery (LAN broadcast + SmartLink relay)

pub mod auth;
pub mod error;
pub mod frame;
pub mod protocol;
pub mod session;
pub mod transport;

pub use auth::{Authenticator, IdToken, StaticToken};
pub use error::Error;
pub use frame::{Frame, FrameClass, FrameDecoder, PassthroughDecoder};
pub use protocol::{RelayCommand, RelayMessage, TestResult, UserSettings};
pub use session::{RelayReader, RelayWriter};
