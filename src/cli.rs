use clap::{Parser, Subcommand};

use catalog_notify::feed::view::{FeedFilter, SortOrder};

/// Project catalog notification feed client
#[derive(Parser)]
#[command(name = "catalog-notify", version, about)]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Mount the feed and print notifications as they arrive (default)
    Watch,

    /// List notifications
    List {
        #[arg(long, value_enum, default_value_t = FeedFilter::All)]
        filter: FeedFilter,
        #[arg(long, value_enum, default_value_t = SortOrder::Newest)]
        sort: SortOrder,
        /// Show at most this many entries
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show unread and total counts
    Count,

    /// Mark one notification as read
    Read { id: i64 },

    /// Mark every notification as read
    ReadAll,

    /// Delete one notification
    Delete { id: i64 },

    /// Delete all notifications
    Clear,

    /// Mark a notification read and print the project it links to
    Open { id: i64 },
}
