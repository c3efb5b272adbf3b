pub mod admin;
pub mod peer;
pub mod torrent;
pub mod user;
pub mod whitelist;
