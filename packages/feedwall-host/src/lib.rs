pub mod app;
pub mod bridge;
pub mod config;
pub mod display;
pub mod feed;
pub mod layout;
pub mod resources;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;
