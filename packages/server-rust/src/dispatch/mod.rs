pub mod auth;
pub mod dispatcher;
pub mod infos;
pub mod registry;
pub mod transport;

pub use auth::StaticAuthorization;
pub use dispatcher::{Dispatcher, DISPATCHER_SERVICE};
pub use infos::{InfosHandler, INFOS_ROUTE};
pub use registry::{HandlerRegistry, Registration, RouteSpec};
pub use transport::{render, ReplyHandle, TransportCall};
