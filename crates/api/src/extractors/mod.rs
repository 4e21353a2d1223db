//! Request extractors.

mod plex_user;

pub use plex_user::PlexUserId;
