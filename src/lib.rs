//! Client for the IRSA Image Browse Engine (IBE): per-mission search and
//! data URLs, result downloads, multi-position uploads and a shortcut to a
//! locally mounted archive.

pub mod config;
pub mod coords;
pub mod download;
pub mod error;
pub mod ibe;
pub mod info;
pub mod missions;
pub mod output;
pub mod params;
pub mod registry;
pub mod source;
pub mod store;
pub mod upload;
