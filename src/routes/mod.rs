//! HTTP routes

pub mod addresses;
pub mod admin;
pub mod auth_routes;
pub mod conversations;
pub mod geo;
pub mod health;
pub mod helpers;
pub mod posts;
pub mod streets;

pub use addresses::handle_address_request;
pub use admin::handle_admin_request;
pub use auth_routes::handle_auth_request;
pub use conversations::handle_conversation_request;
pub use geo::resolve_postcode;
pub use health::health_check;
pub use posts::handle_post_request;
pub use streets::handle_street_request;
