//! Startup configuration for the server.
//!
//! The configuration is read once at startup from command line arguments,
//! falling back to environment variables.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
};

use clap::Parser;

/// The REST API server for expense_tracker.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(version, about, long_about = None)]
pub struct ServerConfig {
    /// File path to the application SQLite database.
    #[arg(long, env = "DATABASE_PATH")]
    pub db_path: String,

    /// The address to serve the API from.
    #[arg(long, env = "BIND_ADDRESS", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub host: IpAddr,

    /// The port to serve the API from.
    #[arg(short, long, env = "PORT", default_value_t = 5000)]
    pub port: u16,

    /// The origin allowed to make cross-origin requests, e.g. the address of
    /// the web frontend. Any origin is allowed if this is not set.
    #[arg(long, env = "FRONTEND_URL")]
    pub allowed_origin: Option<String>,

    /// A comma separated list of the categories that expenses may use.
    /// Categories are free text if this is not set.
    #[arg(long, env = "ALLOWED_CATEGORIES", value_delimiter = ',')]
    pub allowed_categories: Vec<String>,

    /// File path to write debug logs to.
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl ServerConfig {
    /// The socket address the server should listen on.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// The category policy described by `allowed_categories`.
    pub fn category_policy(&self) -> CategoryPolicy {
        CategoryPolicy::from_allowed(&self.allowed_categories)
    }
}

/// Controls which category labels the server accepts for new expenses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CategoryPolicy {
    /// Any non-empty label is accepted.
    #[default]
    FreeText,
    /// Only these labels are accepted, compared case-insensitively.
    Restricted(Vec<String>),
}

impl CategoryPolicy {
    /// Create a policy from a list of allowed categories.
    ///
    /// Entries are trimmed and blank entries are ignored. An empty list means
    /// categories are free text.
    pub fn from_allowed(categories: &[String]) -> Self {
        let categories: Vec<String> = categories
            .iter()
            .map(|category| category.trim())
            .filter(|category| !category.is_empty())
            .map(str::to_owned)
            .collect();

        if categories.is_empty() {
            CategoryPolicy::FreeText
        } else {
            CategoryPolicy::Restricted(categories)
        }
    }

    /// Get the label to store for `category`, or `None` if the policy does
    /// not accept it.
    ///
    /// Restricted policies return the configured spelling so that "food" and
    /// "FOOD" are both stored as, e.g., "Food".
    pub fn resolve(&self, category: &str) -> Option<String> {
        match self {
            CategoryPolicy::FreeText => Some(category.to_owned()),
            CategoryPolicy::Restricted(allowed) => {
                let folded = category.to_lowercase();

                allowed
                    .iter()
                    .find(|candidate| candidate.to_lowercase() == folded)
                    .cloned()
            }
        }
    }
}
