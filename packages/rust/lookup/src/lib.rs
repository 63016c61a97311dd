//! External lookup collaborators.
//!
//! This crate provides:
//! - [`session`]: Isolated per-worker sessions ([`LookupSession`], [`SessionFactory`], [`HttpSession`])
//! - [`LookupProvider`]: The provider contract and [`build_providers`]
//! - [`providers`]: Company registry, professional network, and directory providers

pub mod html;
pub mod provider;
pub mod providers;
pub mod session;

pub use provider::{LookupProvider, LookupQuery, build_providers};
pub use providers::{DirectoryProvider, ProfessionalNetworkProvider, RegistryProvider};
pub use session::{HttpSession, HttpSessionFactory, LookupSession, Page, SessionFactory};
