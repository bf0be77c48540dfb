pub mod api;

#[cfg(feature = "client")]
pub mod client;

#[cfg(any(feature = "server", test))]
pub mod app_config;

#[cfg(any(feature = "server", test))]
pub mod auth;

#[cfg(any(feature = "server", test))]
mod cover_upload;

#[cfg(any(feature = "server", test))]
pub mod error;

#[cfg(any(feature = "server", test))]
mod handlers;

#[cfg(any(feature = "server", test))]
pub mod image_store;

#[cfg(any(feature = "server", test))]
pub mod model;

#[cfg(any(feature = "server", test))]
pub mod repository;

#[cfg(any(feature = "server", test))]
pub mod services;

#[cfg(any(feature = "server", test))]
pub mod settings;
