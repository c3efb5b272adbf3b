pub mod swarm_index;
pub mod user_cache;
pub mod whitelist;
