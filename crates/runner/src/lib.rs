//! User Stream Runner
//!
//! Runs a set of user stream connections and spreads tracked keywords
//! across them:
//!
//! - **Manager**: keyword reference counting, assignment and rebalancing
//! - **Config**: JSON configuration with an embedded default
//! - **Bootstrap**: wiring from configuration to running connections
//!
//! ## Architecture
//!
//! ```text
//!        add_keyword / remove_keyword
//!                    │
//!          ┌─────────▼─────────┐
//!          │  KeywordManager   │  ≤ 100 keywords per connection
//!          └──┬──────┬──────┬──┘
//!             │      │      │   track=...
//!          ┌──▼─┐ ┌──▼─┐ ┌──▼─┐
//!          │conn│ │conn│ │conn│  one per identity
//!          └──┬─┘ └──┬─┘ └──┬─┘
//!             └──────┼──────┘
//!           ┌────────▼────────┐
//!           │ HandlerRegistry │
//!           └─────────────────┘
//! ```

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod manager;

// Re-export main types
pub use bootstrap::{UserStreamApp, logging_registry};
pub use config::{ConfigError, UserStreamConfigFile, load_config, load_default_config};
pub use error::{BootstrapError, ManagerError};
pub use manager::{KeywordAdded, KeywordManager, KeywordRemoved, KeywordReport};
