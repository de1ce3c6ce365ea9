//! Supabase backend: PostgREST for reads and writes, Realtime
//! `postgres_changes` for the push feed.

mod feed;
mod handler;
mod rest;
mod types;

pub use feed::SupabaseChangeFeed;
pub use rest::SupabaseStore;
pub use types::{PhoenixMessage, SupabaseConfig};
