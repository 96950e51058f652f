pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod key;
pub mod pipeline;
pub mod plan;
pub mod quota;
pub mod ratelimit;
pub mod request;
pub mod route;
pub mod router;
pub mod stores;
pub mod transform;
pub mod upstream;
pub mod usage;
pub mod user;

pub use auth::AuthContext;
pub use config::PipelineConfig;
pub use error::GatewayError;
pub use pipeline::Pipeline;
pub use request::{Request, Response};
pub use route::Route;
pub use router::Router;
pub use upstream::Upstream;
