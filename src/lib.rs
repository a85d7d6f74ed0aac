/*!
An ASCOM Alpaca hub: heterogeneous astronomy hardware (cameras, mounts,
focusers, rotators, filter wheels, power/dew controllers) exposed behind the
uniform Alpaca HTTP+JSON device API on the local network.

Clients discover the hub via UDP broadcast ([`server::DiscoveryServer`]),
enumerate devices through the management API and drive them with typed
GET/PUT requests against `/api/v1/{device_type}/{device_number}/{action}`.

Device drivers live in [`drivers`]; each translates typed operations into
serial line-protocol exchanges (or vendor-SDK calls, for cameras) and keeps
a continuously refreshed shadow of device state while connected.
*/

pub mod api;
pub mod devices;
pub mod drivers;
pub mod server;
pub mod transport;

mod errors;

pub use devices::{Devices, TypedDevice};
pub use errors::{ASCOMError, ASCOMErrorCode, ASCOMResult};
pub use server::Server;
