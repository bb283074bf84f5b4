//! Adapters for a hosted Supabase project.

mod realtime;
mod rest;
mod retry;

pub use realtime::SupabaseRealtime;
pub use rest::SupabaseRest;

/// Max characters of an error body kept for logs and error messages.
pub(crate) const BODY_PREVIEW_CHARS: usize = 512;
