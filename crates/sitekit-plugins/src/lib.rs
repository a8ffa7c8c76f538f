//! # sitekit-plugins
//!
//! **Purpose**: Plugin dependency resolution for the SiteKit orchestrator
//!
//! Computes the load order for installed site plugins: a depth-first linear
//! extension of the declared dependency graph that keeps packages as close to
//! their configured base order as possible, pulling a dependency forward only
//! as far as immediately before its first dependent.
//!
//! ## Usage
//!
//! ```rust
//! use sitekit_plugins::{base_order, resolve_load_order, PluginNode};
//!
//! let nodes = vec![
//!     PluginNode::new("sitekit-plugin-forms").depends_on(["sitekit-plugin-core"]),
//!     PluginNode::new("sitekit-plugin-core"),
//! ];
//! let order = base_order(&["sitekit-plugin-core".to_string()], &nodes);
//! let resolved = resolve_load_order(&order, &nodes).unwrap();
//! assert_eq!(resolved[0], "sitekit-plugin-core");
//! ```

pub mod error;
pub mod manifest;
pub mod resolver;

pub use error::{PluginError, Result};
pub use manifest::installed_plugins;
pub use resolver::{base_order, resolve_load_order, PluginNode};
