pub mod api;
pub mod media;
pub mod webhooks;
